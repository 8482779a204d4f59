//! Turns the JSON suite report written by a skiff harness into a
//! standalone HTML page listing each workload's captured logs.

use std::fs;
use std::io::{self, Read, Write};
use std::path::PathBuf;

use anyhow::{Context, Result};
use askama::Template;
use clap::Parser;
use skiff::{JobLogs, SuiteReport};
use time::format_description::well_known::Rfc3339;

#[derive(Parser)]
#[command(name = "skiff-report", about = "Render a skiff suite report as HTML")]
struct Cli {
    /// Path to the JSON suite report; reads stdin when omitted.
    input: Option<PathBuf>,

    /// Write the HTML document here instead of stdout.
    #[arg(short, long)]
    output: Option<PathBuf>,
}

#[derive(Template)]
#[template(path = "report.html")]
struct ReportPage {
    session_id: String,
    generated_at: String,
    jobs: Vec<JobLogs>,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let raw = match &cli.input {
        Some(path) => fs::read_to_string(path)
            .with_context(|| format!("read report {}", path.display()))?,
        None => {
            let mut buffer = String::new();
            io::stdin()
                .read_to_string(&mut buffer)
                .context("read report from stdin")?;
            buffer
        }
    };
    let report: SuiteReport = serde_json::from_str(&raw).context("parse suite report")?;

    let page = ReportPage {
        session_id: report.session_id.clone(),
        generated_at: report
            .generated_at
            .format(&Rfc3339)
            .context("format report timestamp")?,
        jobs: report.job_logs(),
    };
    let html = page.render().context("render report template")?;

    match &cli.output {
        Some(path) => fs::write(path, html)
            .with_context(|| format!("write report to {}", path.display()))?,
        None => io::stdout()
            .write_all(html.as_bytes())
            .context("write report to stdout")?,
    }

    Ok(())
}
