use crate::pipeline::{Dispatch, DispatchStats, Dispatcher, OutputLayout, OutputRecord};
use crate::table::Table;
use crate::types::TranscriptRow;
use crate::{ProcessError, TableError};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

pub const TEXT_COLUMN: &str = "text";
pub const SPEAKER_COLUMN: &str = "speaker";
const CODED_SUFFIX: &str = "_coded";

/// Outcome for one input file in a batch.
#[derive(Debug, Clone, PartialEq)]
pub struct FileReport {
    pub input: PathBuf,
    pub output: PathBuf,
    pub outcome: Result<DispatchStats, String>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct BatchReport {
    pub files: Vec<FileReport>,
}

impl BatchReport {
    pub fn succeeded(&self) -> usize {
        self.files.iter().filter(|file| file.outcome.is_ok()).count()
    }

    pub fn failed(&self) -> usize {
        self.files.len() - self.succeeded()
    }

    pub fn is_success(&self) -> bool {
        self.failed() == 0
    }

    /// Rows written across every successful file.
    pub fn rows_written(&self) -> usize {
        self.files
            .iter()
            .filter_map(|file| file.outcome.as_ref().ok())
            .map(|stats| stats.classified)
            .sum()
    }
}

/// `<dir>/<stem>_coded.csv` for an input file name.
pub fn coded_output_path(input: &Path, dir: &Path) -> PathBuf {
    let stem = input
        .file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .unwrap_or_else(|| "transcript".to_string());
    dir.join(format!("{stem}{CODED_SUFFIX}.csv"))
}

/// Read a transcript as CSV, or as one `text` row per non-blank line when
/// the file is not valid CSV.
pub fn read_transcript(path: &Path) -> Result<Table, ProcessError> {
    match Table::read_csv(path) {
        Ok(table) => Ok(table),
        Err(TableError::NotFound(path)) => Err(ProcessError::NotFound(path)),
        Err(TableError::Parse(reason)) => {
            debug!(path = %path.display(), %reason, "not valid CSV, reading as plain lines");
            let content = fs::read_to_string(path)?;
            Ok(lines_table(&content))
        }
        Err(err) => Err(err.into()),
    }
}

/// One `text` row per non-blank line.
pub fn lines_table(content: &str) -> Table {
    let mut table = Table::new([TEXT_COLUMN]);
    for line in content.lines().map(str::trim).filter(|line| !line.is_empty()) {
        table.push_row(vec![line.to_string()]);
    }
    table
}

/// Resolve the text column: a case-insensitive `text`, or the only column.
/// Renames a lone column to `text`.
pub fn normalize_text_column(table: &mut Table) -> Result<usize, ProcessError> {
    if let Some(idx) = table.position_ci(TEXT_COLUMN) {
        return Ok(idx);
    }
    if table.columns().len() == 1 {
        table.rename_column(0, TEXT_COLUMN);
        return Ok(0);
    }
    Err(ProcessError::MissingColumn(
        "CSV must contain a 'text' column (case-insensitive)".into(),
    ))
}

/// Structured rows for classification, resolved once per table.
pub fn transcript_rows(table: &mut Table) -> Result<Vec<TranscriptRow>, ProcessError> {
    let text = normalize_text_column(table)?;
    let speaker = table.position_ci(SPEAKER_COLUMN);
    Ok((0..table.len())
        .map(|row| TranscriptRow {
            text: table.cell(row, text).map(str::to_string),
            speaker: speaker
                .and_then(|idx| table.cell(row, idx))
                .map(str::to_string),
        })
        .collect())
}

pub fn output_table(layout: OutputLayout, records: &[OutputRecord]) -> Table {
    let mut table = Table::new(layout.header().iter().copied());
    for record in records {
        table.push_row(record.cells());
    }
    table
}

/// Classify an in-memory transcript table without touching the filesystem.
pub fn classify_table(
    dispatcher: &Dispatcher,
    table: &Table,
) -> Result<(Table, DispatchStats), ProcessError> {
    let mut table = table.clone();
    let rows = transcript_rows(&mut table)?;
    let Dispatch { records, stats } = dispatcher.classify_rows(&rows);
    Ok((output_table(dispatcher.layout(), &records), stats))
}

pub fn process_file(
    dispatcher: &Dispatcher,
    input: &Path,
    output: &Path,
) -> Result<DispatchStats, ProcessError> {
    let table = read_transcript(input)?;
    let (coded, stats) = classify_table(dispatcher, &table)?;
    coded.write_csv(output)?;
    info!(
        input = %input.display(),
        output = %output.display(),
        rows = stats.classified,
        skipped = stats.skipped,
        llm_fallbacks = stats.llm_fallbacks,
        "processed transcript"
    );
    Ok(stats)
}

/// Process files or a directory. Input/output shapes that cannot be paired
/// fail up front; failures of individual files are recorded in the report.
pub fn process(
    dispatcher: &Dispatcher,
    inputs: &[PathBuf],
    outputs: &[PathBuf],
) -> Result<BatchReport, ProcessError> {
    let jobs = plan_jobs(inputs, outputs)?;
    let mut report = BatchReport::default();
    for (input, output) in jobs {
        let outcome = process_file(dispatcher, &input, &output).map_err(|err| {
            warn!(input = %input.display(), error = %err, "file failed");
            err.to_string()
        });
        report.files.push(FileReport {
            input,
            output,
            outcome,
        });
    }
    info!(
        files = report.files.len(),
        failed = report.failed(),
        rows = report.rows_written(),
        "batch complete"
    );
    Ok(report)
}

fn plan_jobs(
    inputs: &[PathBuf],
    outputs: &[PathBuf],
) -> Result<Vec<(PathBuf, PathBuf)>, ProcessError> {
    match inputs {
        [] => Err(ProcessError::Arity("no input given".into())),
        [dir] if dir.is_dir() => plan_directory(dir, outputs),
        _ => match outputs {
            [] => Ok(inputs
                .iter()
                .map(|input| {
                    let dir = input.parent().unwrap_or_else(|| Path::new(""));
                    (input.clone(), coded_output_path(input, dir))
                })
                .collect()),
            [dir] if dir.is_dir() => Ok(inputs
                .iter()
                .map(|input| (input.clone(), coded_output_path(input, dir)))
                .collect()),
            _ if outputs.len() == inputs.len() => {
                Ok(inputs.iter().cloned().zip(outputs.iter().cloned()).collect())
            }
            _ => Err(ProcessError::Arity(format!(
                "{} inputs but {} outputs",
                inputs.len(),
                outputs.len()
            ))),
        },
    }
}

fn plan_directory(
    input_dir: &Path,
    outputs: &[PathBuf],
) -> Result<Vec<(PathBuf, PathBuf)>, ProcessError> {
    let [output_dir] = outputs else {
        return Err(ProcessError::Arity(
            "a directory input needs exactly one output directory".into(),
        ));
    };
    if output_dir.exists() && !output_dir.is_dir() {
        return Err(ProcessError::Arity(format!(
            "output must be a directory when input is a directory: {}",
            output_dir.display()
        )));
    }
    fs::create_dir_all(output_dir)?;

    let mut files = Vec::new();
    for entry in fs::read_dir(input_dir)? {
        let path = entry?.path();
        if path.is_file() && path.extension().is_some_and(|ext| ext == "csv") {
            files.push(path);
        }
    }
    files.sort();
    if files.is_empty() {
        warn!(dir = %input_dir.display(), "no .csv files found");
    }

    Ok(files
        .into_iter()
        .filter_map(|path| {
            let name = path.file_name()?.to_owned();
            Some((path, output_dir.join(name)))
        })
        .collect())
}
