//! Loads a corpus of plain-text documents from a directory.

use std::fs;
use std::path::{Path, PathBuf};

use super::types::Document;
use crate::core::errors::RagError;

/// Reads every file in `dir` whose extension is in `extensions`
/// (case-insensitive), ordered by file name. The document id is the file stem.
///
/// Subdirectories are not descended into.
pub fn load_documents(dir: &Path, extensions: &[String]) -> Result<Vec<Document>, RagError> {
    let mut paths: Vec<PathBuf> = fs::read_dir(dir)?
        .filter_map(|entry| entry.ok().map(|entry| entry.path()))
        .filter(|path| path.is_file() && has_extension(path, extensions))
        .collect();
    paths.sort();

    let mut documents = Vec::with_capacity(paths.len());
    for path in paths {
        let Some(id) = path.file_stem().and_then(|stem| stem.to_str()) else {
            tracing::warn!(path = %path.display(), "Skipping file with a non UTF-8 name");
            continue;
        };
        let content = fs::read_to_string(&path).map_err(|err| {
            RagError::Io(std::io::Error::new(
                err.kind(),
                format!("failed to read {}: {}", path.display(), err),
            ))
        })?;
        documents.push(Document::new(id, content));
    }

    tracing::info!(dir = %dir.display(), documents = documents.len(), "Loaded documents");
    Ok(documents)
}

fn has_extension(path: &Path, extensions: &[String]) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| extensions.iter().any(|allowed| allowed.eq_ignore_ascii_case(ext)))
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn extensions() -> Vec<String> {
        vec!["txt".to_string(), "md".to_string()]
    }

    #[test]
    fn loads_matching_files_sorted_by_name() {
        let tmp = tempfile::tempdir().unwrap();
        fs::write(tmp.path().join("b_notes.md"), "beta").unwrap();
        fs::write(tmp.path().join("a_guide.TXT"), "alpha").unwrap();
        fs::write(tmp.path().join("image.png"), [0u8, 1, 2]).unwrap();
        fs::create_dir(tmp.path().join("nested.txt")).unwrap();

        let documents = load_documents(tmp.path(), &extensions()).unwrap();
        let ids: Vec<&str> = documents.iter().map(|doc| doc.id.as_str()).collect();
        assert_eq!(ids, vec!["a_guide", "b_notes"]);
        assert_eq!(documents[0].content, "alpha");
    }

    #[test]
    fn missing_directory_is_not_found() {
        let tmp = tempfile::tempdir().unwrap();
        let err = load_documents(&tmp.path().join("absent"), &extensions()).unwrap_err();
        match err {
            RagError::Io(io) => assert_eq!(io.kind(), std::io::ErrorKind::NotFound),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn empty_directory_yields_no_documents() {
        let tmp = tempfile::tempdir().unwrap();
        assert!(load_documents(tmp.path(), &extensions()).unwrap().is_empty());
    }
}
