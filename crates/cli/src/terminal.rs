use anyhow::Result;
use arrow::record_batch::RecordBatch;
use arrow::util::pretty::pretty_format_batches;
use crossterm::{
    execute,
    style::{Color, Print, ResetColor, SetForegroundColor},
};
use std::io::{self, Write};

use flightdeck_cli::client::{DatasetInfo, FetchedResult, Submission};

/// Color scheme for terminal output.
struct Colors;

impl Colors {
    const HEADER: Color = Color::Magenta;
    const PROGRESS: Color = Color::DarkGrey;
    const TICKET: Color = Color::Green;
    const ERROR: Color = Color::Red;
}

/// Renders client results on stdout / stderr.
pub struct Terminal;

impl Terminal {
    pub fn new() -> Self {
        Self
    }

    fn colored(&self, color: Color, text: &str) -> Result<()> {
        let mut stdout = io::stdout();
        execute!(stdout, SetForegroundColor(color), Print(text), ResetColor, Print("\n"))?;
        stdout.flush()?;
        Ok(())
    }

    pub fn print_datasets(&self, datasets: &[DatasetInfo]) -> Result<()> {
        if datasets.is_empty() {
            return self.colored(Colors::PROGRESS, "(no datasets)");
        }
        self.colored(
            Colors::HEADER,
            &format!("{:<32} {:>8} {:>12} {:>12}", "NAME", "COLUMNS", "ROWS", "BYTES"),
        )?;
        for d in datasets {
            println!(
                "{:<32} {:>8} {:>12} {:>12}",
                d.name,
                d.schema.fields().len(),
                d.total_records,
                d.total_bytes
            );
        }
        Ok(())
    }

    pub fn print_dataset(&self, dataset: &DatasetInfo) -> Result<()> {
        self.colored(Colors::HEADER, &dataset.name)?;
        if let Some(location) = &dataset.location {
            println!("  location: {location}");
        }
        println!("  rows:     {}", dataset.total_records);
        println!("  bytes:    {}", dataset.total_bytes);
        println!("  schema:");
        for field in dataset.schema.fields() {
            let nullable = if field.is_nullable() { " (nullable)" } else { "" };
            println!("    {}: {}{}", field.name(), field.data_type(), nullable);
        }
        Ok(())
    }

    pub fn print_submission(&self, submission: &Submission) -> Result<()> {
        for message in &submission.progress {
            self.colored(Colors::PROGRESS, &format!("  {message}"))?;
        }
        Ok(())
    }

    pub fn print_ticket(&self, submission: &Submission) -> Result<()> {
        self.colored(Colors::TICKET, &format!("ticket: {}", submission.query_id))
    }

    pub fn print_result(&self, result: &FetchedResult) -> Result<()> {
        println!("{}", render_batches(&result.batches)?);
        self.colored(Colors::PROGRESS, &format!("({} rows)", result.num_rows()))
    }

    pub fn print_error(&self, message: &str) -> Result<()> {
        let mut stderr = io::stderr();
        execute!(
            stderr,
            SetForegroundColor(Colors::ERROR),
            Print(format!("error: {message}\n")),
            ResetColor
        )?;
        Ok(())
    }
}

fn render_batches(batches: &[RecordBatch]) -> Result<String> {
    if batches.is_empty() {
        return Ok(String::new());
    }
    Ok(pretty_format_batches(batches)?.to_string())
}
