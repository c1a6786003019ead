//! Result display and output-file logic for the gois CLI.
//!
//! Results go to stdout (one framed block per domain in normal mode, one
//! `domain  status` line in simple mode) and optionally to a file: a text
//! report in normal mode, `domain,status` CSV in simple mode. Summaries go to
//! stderr so stdout stays pipeable.

use console::{pad_str, style, Alignment};
use gois_lib::{BatchSummary, DomainStatus, OutcomeSink, OutputMode, QueryOutcome};
use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::Path;
use std::time::Instant;

const RULE_WIDTH: usize = 80;

// ── Formatting ───────────────────────────────────────────────────────────────

fn heavy_rule() -> String {
    "=".repeat(RULE_WIDTH)
}

fn light_rule() -> String {
    "-".repeat(RULE_WIDTH)
}

fn timestamp() -> String {
    chrono::Local::now().to_rfc3339_opts(chrono::SecondsFormat::Secs, false)
}

/// Header written once at the top of an output file.
pub fn file_header(mode: OutputMode, generated_at: &str) -> String {
    match mode {
        OutputMode::Simple => "domain,status\n".to_string(),
        OutputMode::Normal => format!(
            "# WHOIS results\n# Generated: {}\n# Mode: {}\n{}\n\n",
            generated_at,
            mode,
            heavy_rule()
        ),
    }
}

/// Stdout block for a successful lookup in normal mode: registrar text
/// first, then registry text.
pub fn format_result_block(outcome: &QueryOutcome) -> String {
    let mut block = format!("{}\nDomain: {}\n{}\n", heavy_rule(), outcome.domain, light_rule());

    if let Some(result) = &outcome.result {
        if !result.registrar_result.is_empty() {
            block.push_str("\nRegistrar WHOIS result:\n");
            block.push_str(&result.registrar_result);
            block.push('\n');
        }
        if !result.registry_result.is_empty() {
            block.push_str("\nRegistry WHOIS result:\n");
            block.push_str(&result.registry_result);
            block.push('\n');
        }
    }

    block.push_str(&heavy_rule());
    block
}

/// Output-file entry for one outcome.
pub fn format_file_entry(
    outcome: &QueryOutcome,
    status: Option<DomainStatus>,
    mode: OutputMode,
    queried_at: &str,
) -> String {
    match mode {
        OutputMode::Simple => {
            format!("{},{}\n", outcome.domain, status.unwrap_or(DomainStatus::Unknown))
        }
        OutputMode::Normal => {
            let mut entry = format!(
                "\n{}\nDomain: {}\nQueried: {}\n",
                heavy_rule(),
                outcome.domain,
                queried_at
            );

            match (&outcome.error, &outcome.result) {
                (Some(error), _) => entry.push_str(&format!("Error: {}\n", error)),
                (None, Some(result)) => {
                    for (title, text) in [
                        ("Registrar WHOIS server result", &result.registrar_result),
                        ("Registry WHOIS server result", &result.registry_result),
                    ] {
                        entry.push_str(&format!("\n{}:\n{}\n", title, light_rule()));
                        if text.is_empty() {
                            entry.push_str("No data\n");
                        } else {
                            entry.push_str(text);
                            if !text.ends_with('\n') {
                                entry.push('\n');
                            }
                        }
                    }
                }
                (None, None) => entry.push_str("No data\n"),
            }

            entry.push_str(&format!("\n{}\n", heavy_rule()));
            entry
        }
    }
}

/// One colored `domain  status` line for simple mode.
pub fn format_status_line(domain: &str, status: DomainStatus, failed: bool) -> String {
    let padded_domain = pad_str(domain, 30, Alignment::Left, Some(".."));
    let label = match status {
        DomainStatus::Available => style("available").green().bold(),
        DomainStatus::Registered => style("registered").red().bold(),
        DomainStatus::Unknown => style("unknown").yellow(),
    };
    if failed {
        format!("  {}  {}  {}", padded_domain, label, style("(query failed)").dim())
    } else {
        format!("  {}  {}", padded_domain, label)
    }
}

// ── Sink ─────────────────────────────────────────────────────────────────────

/// Terminal + file sink handed to the batch engine.
///
/// A closed stdout (e.g. piped into `head`) only stops terminal output; the
/// batch and the output file carry on.
pub struct ConsoleSink<W: Write = BufWriter<File>> {
    mode: OutputMode,
    console: Box<dyn Write>,
    file: Option<W>,
    write_error: Option<io::Error>,
    started: Instant,
    print_results: bool,
}

impl ConsoleSink {
    /// Create the sink, creating (truncating) `output` and writing its header.
    pub fn create(mode: OutputMode, output: Option<&Path>) -> io::Result<Self> {
        let file = match output {
            Some(path) => Some(BufWriter::new(File::create(path)?)),
            None => None,
        };
        ConsoleSink::with_writer(mode, file)
    }
}

impl<W: Write> ConsoleSink<W> {
    pub fn with_writer(mode: OutputMode, mut file: Option<W>) -> io::Result<Self> {
        if let Some(writer) = file.as_mut() {
            writer.write_all(file_header(mode, &timestamp()).as_bytes())?;
        }
        Ok(Self {
            mode,
            console: Box::new(io::stdout()),
            file,
            write_error: None,
            started: Instant::now(),
            print_results: true,
        })
    }

    /// Send terminal output somewhere other than stdout.
    #[cfg(test)]
    pub fn with_console<C: Write + 'static>(mut self, console: C) -> Self {
        self.console = Box::new(console);
        self
    }

    /// Flush the output file and surface the first write error, if any.
    pub fn finish(mut self) -> io::Result<Option<W>> {
        if self.print_results {
            if let Err(e) = self.console.flush() {
                self.stop_printing(e);
            }
        }
        if let Some(e) = self.write_error.take() {
            return Err(e);
        }
        if let Some(writer) = self.file.as_mut() {
            writer.flush()?;
        }
        Ok(self.file)
    }

    fn print(&mut self, text: &str) {
        if let Err(e) = writeln!(self.console, "{}", text) {
            self.stop_printing(e);
        }
    }

    fn stop_printing(&mut self, e: io::Error) {
        self.print_results = false;
        match e.kind() {
            io::ErrorKind::BrokenPipe => {
                tracing::debug!("stdout closed, no further results printed")
            }
            _ => tracing::warn!(error = %e, "failed to print results, no further results printed"),
        }
    }

    fn write_file(&mut self, entry: &str) {
        if self.write_error.is_some() {
            return;
        }
        if let Some(writer) = self.file.as_mut() {
            if let Err(e) = writer.write_all(entry.as_bytes()) {
                tracing::error!(error = %e, "failed to write output file; further results go to stdout only");
                self.write_error = Some(e);
            }
        }
    }
}

impl<W: Write> OutcomeSink for ConsoleSink<W> {
    fn on_outcome(&mut self, outcome: &QueryOutcome, status: Option<DomainStatus>) {
        if self.print_results {
            let text = match self.mode {
                OutputMode::Simple => Some(format_status_line(
                    &outcome.domain,
                    status.unwrap_or(DomainStatus::Unknown),
                    !outcome.success,
                )),
                OutputMode::Normal if outcome.success => Some(format_result_block(outcome)),
                OutputMode::Normal => None,
            };
            if let Some(text) = text {
                self.print(&text);
            }
        }

        let entry = format_file_entry(outcome, status, self.mode, &timestamp());
        self.write_file(&entry);
    }

    fn on_summary(&mut self, summary: &BatchSummary) {
        print_summary(summary, self.mode, self.started.elapsed().as_secs_f64());
    }
}

/// Print the final summary bar to stderr.
pub fn print_summary(summary: &BatchSummary, mode: OutputMode, elapsed_secs: f64) {
    let term = console::Term::stderr();
    let requested = summary
        .requested
        .map(|n| n.to_string())
        .unwrap_or_else(|| "?".to_string());

    let _ = term.write_line(&format!(
        "  {}",
        style("────────────────────────────────────────────────────").dim()
    ));
    let _ = term.write_line(&format!(
        "  {}/{} domains in {:.1}s  {}  {}  {}  {}",
        style(summary.processed).bold(),
        requested,
        elapsed_secs,
        style("|").dim(),
        style(format!("{} succeeded", summary.succeeded)).green(),
        style("|").dim(),
        style(format!("{} failed", summary.failed)).red(),
    ));

    if mode == OutputMode::Simple {
        let _ = term.write_line(&format!(
            "  {}  {}  {}  {}  {}",
            style(format!("{} available", summary.available)).green(),
            style("|").dim(),
            style(format!("{} registered", summary.registered)).red(),
            style("|").dim(),
            style(format!("{} unknown", summary.unknown)).yellow(),
        ));
    }
}

// ── Tests ────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use gois_lib::{QueryResult, WhoisError};
    use std::cell::Cell;
    use std::rc::Rc;

    /// Console whose reader has gone away; counts write attempts.
    struct ClosedPipe(Rc<Cell<usize>>);

    impl Write for ClosedPipe {
        fn write(&mut self, _buf: &[u8]) -> io::Result<usize> {
            self.0.set(self.0.get() + 1);
            Err(io::Error::from(io::ErrorKind::BrokenPipe))
        }

        fn flush(&mut self) -> io::Result<()> {
            Err(io::Error::from(io::ErrorKind::BrokenPipe))
        }
    }

    fn success(domain: &str, registry: &str, registrar: &str) -> QueryOutcome {
        QueryOutcome::succeeded(
            domain,
            QueryResult {
                registry_result: registry.to_string(),
                registrar_result: registrar.to_string(),
            },
            1,
        )
    }

    #[test]
    fn test_simple_file_entries() {
        let ok = success("example.com", "Registrar: X", "");
        let failed = QueryOutcome::failed("nodot", WhoisError::bad_domain("nodot"), 1);

        assert_eq!(
            format_file_entry(&ok, Some(DomainStatus::Registered), OutputMode::Simple, "t"),
            "example.com,registered\n"
        );
        assert_eq!(
            format_file_entry(&failed, None, OutputMode::Simple, "t"),
            "nodot,unknown\n"
        );
    }

    #[test]
    fn test_normal_file_entry_sections() {
        let ok = success("example.com", "Domain Name: EXAMPLE.COM\n", "");
        let entry = format_file_entry(&ok, None, OutputMode::Normal, "2026-01-01T00:00:00Z");

        assert!(entry.contains("Domain: example.com"));
        assert!(entry.contains("Queried: 2026-01-01T00:00:00Z"));
        assert!(entry.contains("Registry WHOIS server result:"));
        assert!(entry.contains("Domain Name: EXAMPLE.COM\n"));
        // Registrar section present but empty.
        assert!(entry.contains("No data"));
    }

    #[test]
    fn test_normal_file_entry_error() {
        let failed = QueryOutcome::failed("nodot", WhoisError::bad_domain("nodot"), 1);
        let entry = format_file_entry(&failed, None, OutputMode::Normal, "t");
        assert!(entry.contains("Error: invalid domain: nodot"));
    }

    #[test]
    fn test_result_block_order() {
        let ok = success("example.com", "REGISTRY TEXT", "REGISTRAR TEXT");
        let block = format_result_block(&ok);
        let registrar = block.find("REGISTRAR TEXT").unwrap();
        let registry = block.find("REGISTRY TEXT").unwrap();
        assert!(registrar < registry);
        assert!(block.starts_with(&heavy_rule()));
    }

    #[test]
    fn test_headers() {
        assert_eq!(file_header(OutputMode::Simple, "t"), "domain,status\n");
        let normal = file_header(OutputMode::Normal, "2026-01-01T00:00:00Z");
        assert!(normal.starts_with("# WHOIS results\n"));
        assert!(normal.contains("# Mode: normal"));
    }

    #[test]
    fn test_sink_writes_csv() {
        let mut sink = ConsoleSink::with_writer(OutputMode::Simple, Some(Vec::new()))
            .unwrap()
            .with_console(io::sink());
        sink.on_outcome(
            &success("free.com", "No match", ""),
            Some(DomainStatus::Available),
        );
        sink.on_outcome(
            &QueryOutcome::failed("x.com", WhoisError::proxy("down"), 3),
            None,
        );

        let written = sink.finish().unwrap().unwrap();
        assert_eq!(
            String::from_utf8(written).unwrap(),
            "domain,status\nfree.com,available\nx.com,unknown\n"
        );
    }

    #[test]
    fn test_closed_stdout_keeps_batch_going() {
        let attempts = Rc::new(Cell::new(0));
        let mut sink = ConsoleSink::with_writer(OutputMode::Simple, Some(Vec::new()))
            .unwrap()
            .with_console(ClosedPipe(Rc::clone(&attempts)));

        sink.on_outcome(&success("a.com", "No match", ""), Some(DomainStatus::Available));
        sink.on_outcome(&success("b.com", "Registrar: X", ""), Some(DomainStatus::Registered));
        sink.on_summary(&BatchSummary::new(Some(2)));

        // Printing stops after the first failure; the file still gets every row.
        assert_eq!(attempts.get(), 1);
        let written = sink.finish().unwrap().unwrap();
        assert_eq!(
            String::from_utf8(written).unwrap(),
            "domain,status\na.com,available\nb.com,registered\n"
        );
    }
}
