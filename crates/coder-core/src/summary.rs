use crate::ProcessError;
use crate::pipeline::OutputLayout;
use crate::table::Table;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

pub const FREQUENCY_COLUMN: &str = "frequency";

/// Label counts across coded output files, sorted by code.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FrequencySummary {
    pub layout: Option<OutputLayout>,
    pub counts: BTreeMap<String, usize>,
    /// Files that had no recognizable label column.
    pub skipped: Vec<PathBuf>,
}

impl FrequencySummary {
    pub fn total(&self) -> usize {
        self.counts.values().sum()
    }

    /// Header of the label column in the written summary.
    pub fn label_header(&self) -> &'static str {
        match self.layout {
            Some(OutputLayout::Ranked) => "code",
            _ => "B5T",
        }
    }

    pub fn to_table(&self) -> Table {
        let mut table = Table::new([self.label_header(), FREQUENCY_COLUMN]);
        for (code, count) in &self.counts {
            table.push_row(vec![code.clone(), count.to_string()]);
        }
        table
    }
}

fn label_column(table: &Table) -> Option<(OutputLayout, usize)> {
    [OutputLayout::Labels, OutputLayout::Ranked]
        .into_iter()
        .find_map(|layout| {
            table
                .position_ci(layout.label_column())
                .map(|idx| (layout, idx))
        })
}

/// Count the primary label column across coded files. Files without a label
/// column are skipped with a warning; unreadable files fail the summary.
pub fn summarize_frequencies(paths: &[PathBuf]) -> Result<FrequencySummary, ProcessError> {
    let mut summary = FrequencySummary::default();
    for path in paths {
        let table = Table::read_csv(path)?;
        let Some((layout, column)) = label_column(&table) else {
            warn!(path = %path.display(), "no label column, skipping");
            summary.skipped.push(path.clone());
            continue;
        };
        summary.layout.get_or_insert(layout);
        for label in table.column_values(column).flatten() {
            let label = label.trim();
            if label.is_empty() {
                continue;
            }
            *summary.counts.entry(label.to_string()).or_default() += 1;
        }
    }
    Ok(summary)
}

pub fn write_summary(summary: &FrequencySummary, output: &Path) -> Result<(), ProcessError> {
    summary.to_table().write_csv(output)?;
    info!(
        output = %output.display(),
        codes = summary.counts.len(),
        total = summary.total(),
        "wrote frequency summary"
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn counts_labels_across_files_sorted() {
        let temp = tempfile::tempdir().unwrap();
        let a = temp.path().join("a.csv");
        let b = temp.path().join("b.csv");
        fs::write(&a, "Text,B5T,Subcategory1,Subcategory2\nx,TL,ASP,\ny,CLC,,\nz,99,,\n").unwrap();
        fs::write(&b, "Text,B5T,Subcategory1,Subcategory2\nq,CLC,,\n").unwrap();

        let summary = summarize_frequencies(&[a, b]).unwrap();
        let counts: Vec<_> = summary.counts.iter().map(|(k, v)| (k.as_str(), *v)).collect();
        assert_eq!(counts, [("99", 1), ("CLC", 2), ("TL", 1)]);
        assert_eq!(summary.total(), 4);

        let out = temp.path().join("summary.csv");
        write_summary(&summary, &out).unwrap();
        assert_eq!(
            fs::read_to_string(&out).unwrap().replace("\r\n", "\n"),
            "B5T,frequency\n99,1\nCLC,2\nTL,1\n"
        );
    }

    #[test]
    fn ranked_outputs_use_code_header_and_skip_empty_labels() {
        let temp = tempfile::tempdir().unwrap();
        let path = temp.path().join("ranked.csv");
        fs::write(
            &path,
            "text,primary_code,primary_confidence,secondary_code,secondary_confidence,explanation\n\
             a,CANCEL,1.0,,0.0,\nb,,0.0,,0.0,\n",
        )
        .unwrap();
        let summary = summarize_frequencies(&[path]).unwrap();
        assert_eq!(summary.label_header(), "code");
        assert_eq!(summary.total(), 1);
        assert_eq!(summary.to_table().columns(), ["code", FREQUENCY_COLUMN]);
    }

    #[test]
    fn files_without_labels_are_skipped() {
        let temp = tempfile::tempdir().unwrap();
        let path = temp.path().join("raw.csv");
        fs::write(&path, "text\nroger\n").unwrap();
        let summary = summarize_frequencies(std::slice::from_ref(&path)).unwrap();
        assert!(summary.counts.is_empty());
        assert_eq!(summary.skipped, [path]);
    }

    #[test]
    fn missing_file_fails() {
        let temp = tempfile::tempdir().unwrap();
        let err = summarize_frequencies(&[temp.path().join("absent.csv")]).unwrap_err();
        assert!(matches!(err, ProcessError::Table(_)));
    }
}
