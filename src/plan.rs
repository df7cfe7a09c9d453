//! Import planning: header resolution, slice allocation, page paths.
//!
//! The planner is the only place that touches shared naming state (unique
//! output names, the page-path counter); it runs once, before any task
//! executes, so workers never need to coordinate. Its product is a
//! [`TaskSet`]: self-contained tasks over disjoint record ranges plus a
//! per-column map of page paths, persisted as `plan.json` for downstream
//! table metadata.

use std::{
    collections::HashSet,
    fs,
    path::{Path, PathBuf},
};

use anyhow::{Context, Result};
use log::info;
use serde::{Deserialize, Serialize};

use crate::{
    dialect::Dialect,
    encoding::{EncodedReader, TextEncoding},
    error::ImportError,
    index::NewlineIndex,
    parser::Tokenizer,
    task::Task,
};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlannedColumn {
    /// Header name as it appears in the file.
    pub name: String,
    /// De-duplicated output name (`_k` suffix on collision).
    pub output_name: String,
    /// Source field index.
    pub field: usize,
    /// One page per slice, in slice order.
    pub pages: Vec<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskSet {
    pub source: PathBuf,
    pub encoding: TextEncoding,
    pub dialect: Dialect,
    pub page_size: usize,
    pub guess_dtypes: bool,
    pub columns: Vec<PlannedColumn>,
    pub tasks: Vec<Task>,
}

impl TaskSet {
    /// Writes the manifest next to the pages it describes.
    pub fn save_manifest(&self, pages_dir: &Path) -> Result<PathBuf> {
        let path = pages_dir.join("plan.json");
        let json = serde_json::to_string_pretty(self).context("Serializing plan manifest")?;
        fs::write(&path, json).with_context(|| format!("Writing plan manifest {path:?}"))?;
        Ok(path)
    }
}

pub struct PlanRequest<'a> {
    pub source: &'a Path,
    pub encoding: TextEncoding,
    pub dialect: Dialect,
    /// Requested column names; `None` keeps every header column.
    pub columns: Option<&'a [String]>,
    /// Records per slice.
    pub page_size: usize,
    pub guess_dtypes: bool,
    /// Working directory; pages land in `<workdir>/pages/`.
    pub workdir: &'a Path,
    /// Cap on planned data records.
    pub limit: Option<usize>,
}

pub fn plan(request: &PlanRequest<'_>) -> Result<TaskSet> {
    let index = NewlineIndex::build(request.source, request.encoding)?;
    if index.record_count() == 0 {
        return Err(ImportError::EmptyFile {
            path: request.source.to_path_buf(),
        }
        .into());
    }

    let headers = read_header_row(request)?;
    let kept = resolve_columns(&headers, request.columns)?;
    let output_names = unique_output_names(kept.iter().map(|(_, name)| name.as_str()));

    let pages_dir = request.workdir.join("pages");
    fs::create_dir_all(&pages_dir)
        .with_context(|| format!("Creating pages directory {pages_dir:?}"))?;

    let data_records = index.record_count() - 1;
    let planned_records = match request.limit {
        Some(limit) => data_records.min(limit),
        None => data_records,
    };

    let mut columns: Vec<PlannedColumn> = kept
        .iter()
        .zip(&output_names)
        .map(|((field, name), output_name)| PlannedColumn {
            name: name.clone(),
            output_name: output_name.clone(),
            field: *field,
            pages: Vec::new(),
        })
        .collect();

    let mut allocator = PagePathAllocator::new(&pages_dir);
    let mut tasks = Vec::new();
    let mut start = 1usize;
    while start <= planned_records {
        let rows = request.page_size.min(planned_records + 1 - start);
        let mut pages = Vec::with_capacity(columns.len());
        for column in columns.iter_mut() {
            let path = allocator.next();
            column.pages.push(path.clone());
            pages.push(path);
        }
        tasks.push(Task {
            source: request.source.to_path_buf(),
            encoding: request.encoding,
            dialect: request.dialect,
            pages,
            import_fields: columns.iter().map(|c| c.field).collect(),
            offset: index.offset(start),
            rows,
            guess_dtypes: request.guess_dtypes,
        });
        start += request.page_size;
    }

    info!(
        "Planned {} task(s) over {} record(s), {} column(s), pages in {:?}",
        tasks.len(),
        planned_records,
        columns.len(),
        pages_dir
    );

    Ok(TaskSet {
        source: request.source.to_path_buf(),
        encoding: request.encoding,
        dialect: request.dialect,
        page_size: request.page_size,
        guess_dtypes: request.guess_dtypes,
        columns,
        tasks,
    })
}

fn read_header_row(request: &PlanRequest<'_>) -> Result<Vec<String>> {
    let mut reader = EncodedReader::open(request.source, request.encoding)?;
    let mut tokenizer = Tokenizer::new(request.dialect);
    if !tokenizer.read_record(&mut reader)? {
        return Err(ImportError::EmptyFile {
            path: request.source.to_path_buf(),
        }
        .into());
    }
    Ok(tokenizer.fields().to_vec())
}

/// Maps requested names onto header positions; reports every missing name
/// at once. Duplicate headers resolve to their first occurrence.
fn resolve_columns(
    headers: &[String],
    requested: Option<&[String]>,
) -> Result<Vec<(usize, String)>> {
    match requested {
        None => Ok(headers
            .iter()
            .enumerate()
            .map(|(ix, name)| (ix, name.clone()))
            .collect()),
        Some(names) => {
            let mut kept = Vec::with_capacity(names.len());
            let mut missing = Vec::new();
            for name in names {
                match headers.iter().position(|header| header == name) {
                    Some(ix) => kept.push((ix, name.clone())),
                    None => missing.push(name.clone()),
                }
            }
            if !missing.is_empty() {
                return Err(ImportError::MissingColumns(missing).into());
            }
            Ok(kept)
        }
    }
}

/// Appends `_k` suffixes until each name is unique among those already
/// chosen. Matching is case-sensitive and exact.
fn unique_output_names<'a, I>(names: I) -> Vec<String>
where
    I: Iterator<Item = &'a str>,
{
    let mut chosen: HashSet<String> = HashSet::new();
    let mut out = Vec::new();
    for name in names {
        let mut candidate = name.to_string();
        let mut k = 1usize;
        while chosen.contains(&candidate) {
            candidate = format!("{name}_{k}");
            k += 1;
        }
        chosen.insert(candidate.clone());
        out.push(candidate);
    }
    out
}

struct PagePathAllocator {
    dir: PathBuf,
    next: usize,
}

impl PagePathAllocator {
    fn new(dir: &Path) -> Self {
        Self {
            dir: dir.to_path_buf(),
            next: 0,
        }
    }

    /// Monotonically numbered `<n>.npy`, skipping names already on disk.
    fn next(&mut self) -> PathBuf {
        loop {
            let candidate = self.dir.join(format!("{}.npy", self.next));
            self.next += 1;
            if !candidate.exists() {
                return candidate;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request<'a>(
        source: &'a Path,
        workdir: &'a Path,
        columns: Option<&'a [String]>,
        page_size: usize,
    ) -> PlanRequest<'a> {
        PlanRequest {
            source,
            encoding: TextEncoding::Utf8,
            dialect: Dialect::default(),
            columns,
            page_size,
            guess_dtypes: true,
            workdir,
            limit: None,
        }
    }

    fn write_csv(dir: &Path, body: &str) -> PathBuf {
        let path = dir.join("input.csv");
        fs::write(&path, body).unwrap();
        path
    }

    #[test]
    fn slices_are_disjoint_and_cover_all_records() {
        let dir = tempfile::tempdir().unwrap();
        let mut body = String::from("A,B\n");
        for i in 0..10 {
            body.push_str(&format!("{i},{i}\n"));
        }
        let source = write_csv(dir.path(), &body);
        let set = plan(&request(&source, dir.path(), None, 3)).unwrap();
        assert_eq!(set.tasks.len(), 4);
        assert_eq!(
            set.tasks.iter().map(|t| t.rows).collect::<Vec<_>>(),
            [3, 3, 3, 1]
        );
        let offsets: Vec<u64> = set.tasks.iter().map(|t| t.offset).collect();
        assert!(offsets.windows(2).all(|w| w[0] < w[1]));
        assert_eq!(offsets[0], 4);

        // No two tasks share a page path.
        let mut seen = HashSet::new();
        for task in &set.tasks {
            for page in &task.pages {
                assert!(seen.insert(page.clone()), "duplicate page {page:?}");
            }
        }
    }

    #[test]
    fn page_numbering_interleaves_columns_within_a_slice() {
        let dir = tempfile::tempdir().unwrap();
        let source = write_csv(dir.path(), "A,B\n1,2\n3,4\n5,6\n7,8\n");
        let set = plan(&request(&source, dir.path(), None, 3)).unwrap();
        let names: Vec<String> = set.tasks[0]
            .pages
            .iter()
            .chain(set.tasks[1].pages.iter())
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, ["0.npy", "1.npy", "2.npy", "3.npy"]);
    }

    #[test]
    fn existing_page_files_are_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let source = write_csv(dir.path(), "A\n1\n");
        let pages_dir = dir.path().join("pages");
        fs::create_dir_all(&pages_dir).unwrap();
        fs::write(pages_dir.join("0.npy"), b"taken").unwrap();
        let set = plan(&request(&source, dir.path(), None, 3)).unwrap();
        assert_eq!(
            set.tasks[0].pages[0].file_name().unwrap().to_string_lossy(),
            "1.npy"
        );
    }

    #[test]
    fn requested_columns_project_and_order_fields() {
        let dir = tempfile::tempdir().unwrap();
        let source = write_csv(dir.path(), "A,B,C\n1,2,3\n");
        let columns = vec!["C".to_string(), "A".to_string()];
        let set = plan(&request(&source, dir.path(), Some(&columns), 3)).unwrap();
        assert_eq!(set.tasks[0].import_fields, [2, 0]);
        assert_eq!(set.columns[0].name, "C");
        assert_eq!(set.columns[1].name, "A");
    }

    #[test]
    fn missing_columns_are_reported_together() {
        let dir = tempfile::tempdir().unwrap();
        let source = write_csv(dir.path(), "A,B\n1,2\n");
        let columns = vec!["A".to_string(), "X".to_string(), "Y".to_string()];
        let err = plan(&request(&source, dir.path(), Some(&columns), 3)).unwrap_err();
        let message = err.to_string();
        assert!(message.contains("Missing columns"));
        assert!(message.contains('X') && message.contains('Y'));
        assert!(!message.contains('A'));
    }

    #[test]
    fn duplicate_headers_get_suffixed_output_names() {
        let dir = tempfile::tempdir().unwrap();
        let source = write_csv(dir.path(), "A,A,A_1\n1,2,3\n");
        let set = plan(&request(&source, dir.path(), None, 3)).unwrap();
        let names: Vec<&str> = set.columns.iter().map(|c| c.output_name.as_str()).collect();
        assert_eq!(names, ["A", "A_1", "A_1_1"]);
    }

    #[test]
    fn empty_file_fails_before_any_io() {
        let dir = tempfile::tempdir().unwrap();
        let source = write_csv(dir.path(), "");
        let err = plan(&request(&source, dir.path(), None, 3)).unwrap_err();
        assert!(err.to_string().contains("end of file"));
    }

    #[test]
    fn header_only_file_plans_zero_tasks() {
        let dir = tempfile::tempdir().unwrap();
        let source = write_csv(dir.path(), "A,B\n");
        let set = plan(&request(&source, dir.path(), None, 3)).unwrap();
        assert!(set.tasks.is_empty());
    }

    #[test]
    fn limit_caps_planned_records() {
        let dir = tempfile::tempdir().unwrap();
        let source = write_csv(dir.path(), "A\n1\n2\n3\n4\n5\n");
        let mut req = request(&source, dir.path(), None, 2);
        req.limit = Some(3);
        let set = plan(&req).unwrap();
        assert_eq!(
            set.tasks.iter().map(|t| t.rows).collect::<Vec<_>>(),
            [2, 1]
        );
    }

    #[test]
    fn manifest_round_trips_through_json() {
        let dir = tempfile::tempdir().unwrap();
        let source = write_csv(dir.path(), "A\n1\n2\n");
        let set = plan(&request(&source, dir.path(), None, 3)).unwrap();
        let manifest = set.save_manifest(&dir.path().join("pages")).unwrap();
        let loaded: TaskSet =
            serde_json::from_str(&fs::read_to_string(manifest).unwrap()).unwrap();
        assert_eq!(loaded.tasks.len(), 1);
        assert_eq!(loaded.columns[0].name, "A");
        assert_eq!(loaded.tasks[0].offset, set.tasks[0].offset);
    }
}
