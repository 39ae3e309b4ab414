use crate::TableError;
use std::fs;
use std::io;
use std::path::Path;

/// In-memory string table with a header row.
///
/// Every cell is kept as text; an empty cell is treated as null by the
/// accessors that return `Option<&str>`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Table {
    columns: Vec<String>,
    rows: Vec<Vec<String>>,
}

impl Table {
    pub fn new<S: Into<String>>(columns: impl IntoIterator<Item = S>) -> Self {
        Self {
            columns: columns.into_iter().map(Into::into).collect(),
            rows: Vec::new(),
        }
    }

    /// Build a table column by column, padding short columns with nulls.
    pub fn from_columns<S: Into<String>>(columns: Vec<(S, Vec<&str>)>) -> Self {
        let height = columns
            .iter()
            .map(|(_, values)| values.len())
            .max()
            .unwrap_or(0);
        let mut table = Self::new(Vec::<String>::new());
        let mut data = Vec::with_capacity(columns.len());
        for (name, values) in columns {
            table.columns.push(name.into());
            data.push(values);
        }
        for row in 0..height {
            table.rows.push(
                data.iter()
                    .map(|values| values.get(row).copied().unwrap_or_default().to_string())
                    .collect(),
            );
        }
        table
    }

    pub fn read_csv(path: &Path) -> Result<Self, TableError> {
        let content = match fs::read_to_string(path) {
            Ok(content) => content,
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                return Err(TableError::NotFound(path.display().to_string()));
            }
            Err(err) => return Err(TableError::Io(err)),
        };
        Self::from_csv_str(&content)
    }

    /// Parse strict CSV: the first record is the header and every record must
    /// have the same width.
    pub fn from_csv_str(content: &str) -> Result<Self, TableError> {
        let content = content.strip_prefix('\u{feff}').unwrap_or(content);
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(true)
            .from_reader(content.as_bytes());
        let columns: Vec<String> = reader
            .headers()
            .map_err(|e| TableError::Parse(e.to_string()))?
            .iter()
            .map(str::to_string)
            .collect();
        if columns.is_empty() {
            return Err(TableError::Parse("no header row".into()));
        }

        let mut rows = Vec::new();
        for record in reader.records() {
            let record = record.map_err(|e| TableError::Parse(e.to_string()))?;
            rows.push(record.iter().map(str::to_string).collect());
        }
        Ok(Self { columns, rows })
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn position(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|column| column == name)
    }

    /// Column index by trimmed, case-insensitive name.
    pub fn position_ci(&self, name: &str) -> Option<usize> {
        self.columns
            .iter()
            .position(|column| column.trim().eq_ignore_ascii_case(name))
    }

    pub fn cell(&self, row: usize, column: usize) -> Option<&str> {
        self.rows
            .get(row)
            .and_then(|cells| cells.get(column))
            .map(String::as_str)
            .filter(|value| !value.is_empty())
    }

    pub fn column_values(&self, column: usize) -> impl Iterator<Item = Option<&str>> + '_ {
        (0..self.rows.len()).map(move |row| self.cell(row, column))
    }

    pub fn rename_column(&mut self, column: usize, name: &str) {
        if let Some(slot) = self.columns.get_mut(column) {
            *slot = name.to_string();
        }
    }

    pub fn push_row(&mut self, mut cells: Vec<String>) {
        cells.resize(self.columns.len(), String::new());
        self.rows.push(cells);
    }

    pub fn write_csv(&self, path: &Path) -> Result<(), TableError> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        let mut writer = csv::Writer::from_path(path).map_err(io::Error::from)?;
        self.write_records(&mut writer)?;
        writer.flush()?;
        Ok(())
    }

    pub fn to_csv_string(&self) -> Result<String, TableError> {
        let mut writer = csv::Writer::from_writer(Vec::new());
        self.write_records(&mut writer)?;
        let bytes = writer
            .into_inner()
            .map_err(|e| TableError::Io(e.into_error()))?;
        String::from_utf8(bytes).map_err(|e| TableError::Parse(e.to_string()))
    }

    fn write_records<W: io::Write>(&self, writer: &mut csv::Writer<W>) -> Result<(), TableError> {
        writer.write_record(&self.columns).map_err(io::Error::from)?;
        for row in &self.rows {
            writer.write_record(row).map_err(io::Error::from)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::Table;
    use crate::TableError;

    #[test]
    fn parses_header_and_rows() {
        let table = Table::from_csv_str("Text,speaker\nroger that,WL\n\"yes, please\",\n").unwrap();
        assert_eq!(table.columns(), ["Text", "speaker"]);
        assert_eq!(table.len(), 2);
        assert_eq!(table.cell(1, 0), Some("yes, please"));
        assert_eq!(table.cell(1, 1), None);
        assert_eq!(table.position_ci("text"), Some(0));
        assert_eq!(table.position("text"), None);
    }

    #[test]
    fn ragged_records_are_a_parse_error() {
        let err = Table::from_csv_str("text\nhello, there\n").unwrap_err();
        assert!(matches!(err, TableError::Parse(_)));
    }

    #[test]
    fn empty_input_is_a_parse_error() {
        assert!(matches!(
            Table::from_csv_str("").unwrap_err(),
            TableError::Parse(_)
        ));
    }

    #[test]
    fn missing_file_is_not_found() {
        let temp = tempfile::tempdir().unwrap();
        let err = Table::read_csv(&temp.path().join("absent.csv")).unwrap_err();
        assert!(matches!(err, TableError::NotFound(_)));
    }

    #[test]
    fn write_creates_parent_dirs_and_quotes() {
        let temp = tempfile::tempdir().unwrap();
        let path = temp.path().join("nested").join("out.csv");
        let mut table = Table::new(["Text", "B5T"]);
        table.push_row(vec!["yes, go ahead".to_string(), "CLC".to_string()]);
        table.write_csv(&path).unwrap();

        let loaded = Table::read_csv(&path).unwrap();
        assert_eq!(loaded, table);
        assert!(table.to_csv_string().unwrap().contains("\"yes, go ahead\""));
    }

    #[test]
    fn from_columns_pads_short_columns() {
        let table = Table::from_columns(vec![("a", vec!["1", "2"]), ("b", vec!["x"])]);
        assert_eq!(table.len(), 2);
        assert_eq!(table.cell(1, 1), None);
    }
}
