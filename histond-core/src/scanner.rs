use histond_common::Result;
use std::path::{Path, PathBuf};

fn is_parquet(path: &Path) -> bool {
    path.extension().and_then(|e| e.to_str()) == Some("parquet")
}

pub fn scan_directory(base: &Path) -> Result<Vec<PathBuf>> {
    let mut results = Vec::new();
    scan_recursive(base, &mut results)?;
    results.sort();
    Ok(results)
}

fn scan_recursive(dir: &Path, out: &mut Vec<PathBuf>) -> Result<()> {
    for entry in std::fs::read_dir(dir)? {
        let path = entry?.path();
        if path.is_dir() {
            scan_recursive(&path, out)?;
        } else if is_parquet(&path) {
            out.push(path);
        }
    }
    Ok(())
}

/// resolve a path string: single file, directory (recursive), or glob pattern
pub fn resolve_paths(input: &str) -> Result<Vec<PathBuf>> {
    let path = Path::new(input);
    if path.is_file() {
        return Ok(vec![path.to_path_buf()]);
    }
    if path.is_dir() {
        return scan_directory(path);
    }
    let mut results = Vec::new();
    if let Ok(entries) = glob::glob(input) {
        for entry in entries.flatten() {
            if entry.is_file() && is_parquet(&entry) {
                results.push(entry);
            }
        }
    }
    Ok(results)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolves_files_dirs_and_globs() {
        let dir = tempfile::tempdir().unwrap();
        let nested = dir.path().join("part=1");
        std::fs::create_dir_all(&nested).unwrap();
        for p in [dir.path().join("b.parquet"), nested.join("a.parquet"), dir.path().join("notes.txt")] {
            std::fs::write(p, b"").unwrap();
        }
        let all = resolve_paths(dir.path().to_str().unwrap()).unwrap();
        assert_eq!(all.len(), 2);
        assert!(all.iter().all(|p| is_parquet(p)));

        let single = dir.path().join("b.parquet");
        assert_eq!(resolve_paths(single.to_str().unwrap()).unwrap(), vec![single]);

        let pattern = format!("{}/*.parquet", dir.path().display());
        assert_eq!(resolve_paths(&pattern).unwrap().len(), 1);

        let missing = format!("{}/nothing-*.parquet", dir.path().display());
        assert!(resolve_paths(&missing).unwrap().is_empty());
    }
}
