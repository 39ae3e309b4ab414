use crate::infer::{self, CODE_ALTERNATIVES, KEYWORD_ALTERNATIVES};
use crate::table::Table;
use crate::types::DictionaryEntry;
use crate::{DictionaryError, TableError};
use std::collections::HashSet;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use sha2::{Digest, Sha256};
use time::OffsetDateTime;
use time::format_description::BorrowedFormatItem;
use time::macros::format_description;
use tracing::{debug, info};

const CODE_HEADERS: [&str; 2] = ["b5t", "category"];
const KEYWORDS_HEADER: &str = "keywords";
const BACKUP_STAMP: &[BorrowedFormatItem<'static>] =
    format_description!("[year][month][day]T[hour][minute][second]Z");

/// Keyword dictionary passed explicitly to the engine.
///
/// Codes are unique; a code listed on several rows of the source file
/// collects all of their keywords in file order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Dictionary {
    entries: Vec<DictionaryEntry>,
    source: Option<PathBuf>,
}

impl Dictionary {
    pub fn new(entries: impl IntoIterator<Item = DictionaryEntry>) -> Self {
        let mut dictionary = Self::default();
        for entry in entries {
            dictionary.insert(entry.code, entry.keywords);
        }
        dictionary
    }

    pub fn entries(&self) -> &[DictionaryEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, code: &str) -> Option<&DictionaryEntry> {
        self.entries.iter().find(|entry| entry.code == code)
    }

    pub fn codes(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|entry| entry.code.as_str())
    }

    pub fn source(&self) -> Option<&Path> {
        self.source.as_deref()
    }

    /// Content fingerprint: the first 8 bytes of a SHA-256 over codes and
    /// keywords in order, hex encoded. Stable across builds and platforms.
    pub fn version(&self) -> String {
        let mut hasher = Sha256::new();
        for entry in &self.entries {
            hasher.update(entry.code.as_bytes());
            hasher.update([0x1f]);
            for keyword in &entry.keywords {
                hasher.update(keyword.as_bytes());
                hasher.update([0x1e]);
            }
            hasher.update([0x1d]);
        }
        hex::encode(&hasher.finalize()[..8])
    }

    fn insert(&mut self, code: String, keywords: Vec<String>) {
        let code = code.trim().to_string();
        if code.is_empty() {
            return;
        }
        match self.entries.iter_mut().find(|entry| entry.code == code) {
            Some(entry) => entry.keywords.extend(keywords),
            None => self.entries.push(DictionaryEntry { code, keywords }),
        }
    }
}

/// Split a comma-separated keyword cell into trimmed, lowercase tokens.
pub fn split_keywords(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|keyword| keyword.trim().to_lowercase())
        .filter(|keyword| !keyword.is_empty())
        .collect()
}

pub fn load_dictionary(path: &Path) -> Result<Dictionary, DictionaryError> {
    let content = match fs::read_to_string(path) {
        Ok(content) => content,
        Err(err) if err.kind() == io::ErrorKind::NotFound => {
            return Err(DictionaryError::NotFound(path.display().to_string()));
        }
        Err(err) => return Err(DictionaryError::Io(err)),
    };
    let mut dictionary = parse_dictionary(&content)?;
    dictionary.source = Some(path.to_path_buf());
    info!(
        path = %path.display(),
        codes = dictionary.len(),
        version = %dictionary.version(),
        "dictionary loaded"
    );
    Ok(dictionary)
}

/// Parse dictionary CSV text.
///
/// A first row containing a known column name is a header and column roles
/// are taken from it; otherwise the rows are literal `code,keywords` pairs.
pub fn parse_dictionary(content: &str) -> Result<Dictionary, DictionaryError> {
    let content = content.strip_prefix('\u{feff}').unwrap_or(content);
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_reader(content.as_bytes());
    let mut records: Vec<Vec<String>> = Vec::new();
    for record in reader.records() {
        let record = record.map_err(|e| DictionaryError::Parse(e.to_string()))?;
        records.push(record.iter().map(str::to_string).collect());
    }

    let Some(first) = records.first() else {
        return Ok(Dictionary::default());
    };

    let (code_idx, keyword_idx, data) = if looks_like_header(first) {
        let (code_idx, keyword_idx) = header_roles(&records)?;
        (code_idx, keyword_idx, &records[1..])
    } else {
        (0, 1, &records[..])
    };

    let mut dictionary = Dictionary::default();
    for (line, row) in data.iter().enumerate() {
        let code = row.get(code_idx).map(|v| v.trim()).unwrap_or_default();
        let raw = row.get(keyword_idx).map(|v| v.trim()).unwrap_or_default();
        if code.is_empty() || raw.is_empty() {
            debug!(line, "skipping dictionary row with fewer than two fields");
            continue;
        }
        dictionary.insert(code.to_string(), split_keywords(raw));
    }
    Ok(dictionary)
}

/// A row is a header when any cell is a known column name, or when every
/// populated cell carries an indicator token (`Tag,Phrases`).
fn looks_like_header(row: &[String]) -> bool {
    let known = row.iter().any(|cell| {
        let cell = cell.trim().to_lowercase();
        CODE_HEADERS.contains(&cell.as_str())
            || cell == KEYWORDS_HEADER
            || cell == infer::PREFERRED_CODE_COLUMN
            || KEYWORD_ALTERNATIVES.contains(&cell.as_str())
            || CODE_ALTERNATIVES.contains(&cell.as_str())
    });
    let populated: Vec<&String> = row.iter().filter(|cell| !cell.trim().is_empty()).collect();
    known
        || (populated.len() >= 2 && populated.iter().all(|cell| infer::names_a_role(cell)))
}

fn header_roles(records: &[Vec<String>]) -> Result<(usize, usize), DictionaryError> {
    let header = &records[0];
    let find = |name: &str| {
        header
            .iter()
            .position(|cell| cell.trim().eq_ignore_ascii_case(name))
    };
    let code = CODE_HEADERS.iter().find_map(|name| find(*name));
    if let (Some(code), Some(keywords)) = (code, find(KEYWORDS_HEADER)) {
        return Ok((code, keywords));
    }

    if let Some(roles) = infer::roles_from_names(header) {
        return Ok(roles);
    }

    let mut table = Table::new(header.iter().map(|cell| cell.trim().to_string()));
    for row in &records[1..] {
        table.push_row(row.clone());
    }
    let roles = infer::infer_by_name(&table)?;
    let keyword = table.position(&roles.keyword);
    let code = table.position(&roles.code);
    match (code, keyword) {
        (Some(code), Some(keyword)) => Ok((code, keyword)),
        _ => Err(DictionaryError::InvalidColumns(format!(
            "could not locate {} and {}",
            roles.code, roles.keyword
        ))),
    }
}

/// Replace the dictionary at `dest` with `source`.
///
/// The source must have exactly the columns `category,keywords` or
/// `b5t,keywords`. An existing `dest` is renamed to a timestamped backup
/// next to it, whose path is returned.
pub fn install_dictionary(source: &Path, dest: &Path) -> Result<Option<PathBuf>, DictionaryError> {
    let table = Table::read_csv(source).map_err(|err| match err {
        TableError::NotFound(path) => DictionaryError::NotFound(path),
        TableError::Parse(msg) => DictionaryError::Parse(msg),
        TableError::Io(err) => DictionaryError::Io(err),
    })?;
    validate_install_columns(table.columns())?;

    if let Some(parent) = dest.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }

    let backup = if dest.exists() {
        let backup = backup_path(dest, OffsetDateTime::now_utc())?;
        fs::rename(dest, &backup)?;
        Some(backup)
    } else {
        None
    };
    fs::copy(source, dest)?;

    info!(
        dest = %dest.display(),
        backup = ?backup.as_ref().map(|p| p.display().to_string()),
        rows = table.len(),
        "dictionary installed"
    );
    Ok(backup)
}

fn validate_install_columns(columns: &[String]) -> Result<(), DictionaryError> {
    let found: HashSet<String> = columns.iter().map(|c| c.trim().to_lowercase()).collect();
    let accepted = CODE_HEADERS.iter().any(|code| {
        let expected: HashSet<String> = [code.to_string(), KEYWORDS_HEADER.to_string()].into();
        found == expected && columns.len() == 2
    });
    if accepted {
        return Ok(());
    }
    Err(DictionaryError::InvalidColumns(format!(
        "expected exactly category,keywords or b5t,keywords (found {})",
        columns.join(",")
    )))
}

fn backup_path(dest: &Path, now: OffsetDateTime) -> Result<PathBuf, DictionaryError> {
    let parent = dest.parent().unwrap_or_else(|| Path::new(""));
    let stem = dest
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "dictionary".to_string());
    let stamp = now.format(BACKUP_STAMP).map_err(io::Error::other)?;
    let mut candidate = parent.join(format!("{stem}-{stamp}.csv"));
    let mut suffix = 1;
    while candidate.exists() {
        candidate = parent.join(format!("{stem}-{stamp}-{suffix}.csv"));
        suffix += 1;
    }
    Ok(candidate)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn headed_dictionary_uses_named_columns() {
        let dict = parse_dictionary("keywords,category\n\"Roger, copy that\",CLC\nwell done,MV\n")
            .unwrap();
        assert_eq!(dict.len(), 2);
        assert_eq!(
            dict.entries()[0],
            DictionaryEntry {
                code: "CLC".to_string(),
                keywords: vec!["roger".to_string(), "copy that".to_string()],
            }
        );
        assert_eq!(dict.get("MV").unwrap().keywords, vec!["well done"]);
    }

    #[test]
    fn headless_dictionary_is_code_then_keywords() {
        let dict = parse_dictionary("CLC,\"roger, copy\"\nWL,watchleader\n").unwrap();
        assert_eq!(dict.codes().collect::<Vec<_>>(), vec!["CLC", "WL"]);
        assert_eq!(dict.get("CLC").unwrap().keywords, vec!["roger", "copy"]);
    }

    #[test]
    fn header_roles_fall_back_to_alternative_names() {
        let dict = parse_dictionary("term,label\ncancel my subscription,CANCEL\n").unwrap();
        assert_eq!(dict.get("CANCEL").unwrap().keywords, vec!["cancel my subscription"]);
    }

    #[test]
    fn indicator_headers_are_not_loaded_as_data() {
        let dict = parse_dictionary("Tag,Phrases\nCLC,\"roger, copy\"\nMV,well done\n").unwrap();
        assert_eq!(dict.len(), 2);
        assert!(dict.get("Tag").is_none());
        assert_eq!(dict.get("CLC").unwrap().keywords, vec!["roger", "copy"]);
    }

    #[test]
    fn short_rows_are_skipped_and_duplicates_merge() {
        let content = "b5t,keywords\nCLC,roger\nORD\n,orphan\nCLC,copy that\n";
        let dict = parse_dictionary(content).unwrap();
        assert_eq!(dict.len(), 1);
        assert_eq!(dict.get("CLC").unwrap().keywords, vec!["roger", "copy that"]);
    }

    #[test]
    fn version_tracks_content() {
        let a = parse_dictionary("CLC,roger\n").unwrap();
        let b = parse_dictionary("CLC,roger\n").unwrap();
        let c = parse_dictionary("CLC,\"roger, copy\"\n").unwrap();
        assert_eq!(a.version(), b.version());
        assert_ne!(a.version(), c.version());
        assert_eq!(a.version(), "6817a81951cd1059");
    }

    #[test]
    fn load_reports_missing_file() {
        let temp = tempfile::tempdir().unwrap();
        let err = load_dictionary(&temp.path().join("dictionary.csv")).unwrap_err();
        assert!(matches!(err, DictionaryError::NotFound(_)));
    }

    #[test]
    fn load_records_source_path() {
        let temp = tempfile::tempdir().unwrap();
        let path = temp.path().join("dictionary.csv");
        fs::write(&path, "category,keywords\nMV,great work\n").unwrap();
        let dict = load_dictionary(&path).unwrap();
        assert_eq!(dict.source(), Some(path.as_path()));
        assert_eq!(dict.len(), 1);
    }

    #[test]
    fn install_backs_up_previous_dictionary() {
        let temp = tempfile::tempdir().unwrap();
        let dest = temp.path().join("store").join("dictionary.csv");
        let first = temp.path().join("first.csv");
        let second = temp.path().join("second.csv");
        fs::write(&first, "category,keywords\nCLC,roger\n").unwrap();
        fs::write(&second, "B5T,Keywords\nMV,well done\n").unwrap();

        assert_eq!(install_dictionary(&first, &dest).unwrap(), None);
        let backup = install_dictionary(&second, &dest).unwrap().unwrap();

        assert!(backup.file_name().unwrap().to_string_lossy().starts_with("dictionary-"));
        assert_eq!(fs::read_to_string(&backup).unwrap(), "category,keywords\nCLC,roger\n");
        assert_eq!(fs::read_to_string(&dest).unwrap(), "B5T,Keywords\nMV,well done\n");
    }

    #[test]
    fn install_rejects_unexpected_columns() {
        let temp = tempfile::tempdir().unwrap();
        let source = temp.path().join("bad.csv");
        let dest = temp.path().join("dictionary.csv");
        fs::write(&source, "keyword,code,extra\nroger,CLC,x\n").unwrap();
        fs::write(&dest, "category,keywords\nCLC,roger\n").unwrap();

        let err = install_dictionary(&source, &dest).unwrap_err();
        assert!(matches!(err, DictionaryError::InvalidColumns(_)));
        assert_eq!(fs::read_to_string(&dest).unwrap(), "category,keywords\nCLC,roger\n");
    }

    #[test]
    fn backup_path_avoids_collisions() {
        let temp = tempfile::tempdir().unwrap();
        let dest = temp.path().join("dictionary.csv");
        let now = OffsetDateTime::UNIX_EPOCH;
        let first = backup_path(&dest, now).unwrap();
        assert_eq!(first.file_name().unwrap(), "dictionary-19700101T000000Z.csv");
        fs::write(&first, "").unwrap();
        let second = backup_path(&dest, now).unwrap();
        assert_eq!(second.file_name().unwrap(), "dictionary-19700101T000000Z-1.csv");
    }
}
