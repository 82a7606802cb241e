//! Colored status lines for the terminal

use crate::error::PipelineError;
use crate::pipeline::RunReport;
use std::io::{self, Write};
use termcolor::{Color, ColorChoice, ColorSpec, StandardStream, WriteColor};

fn color_choice(color: bool) -> ColorChoice {
    if color {
        ColorChoice::Auto
    } else {
        ColorChoice::Never
    }
}

/// Print the summary of a successful run to stdout
pub fn print_report(report: &RunReport, color: bool) -> io::Result<()> {
    let mut stdout = StandardStream::stdout(color_choice(color));

    stdout.set_color(ColorSpec::new().set_fg(Some(Color::Green)).set_bold(true))?;
    write!(stdout, "Suffix array built successfully: ")?;
    stdout.reset()?;
    writeln!(stdout, "{}", report.output.display())?;

    writeln!(stdout, "  Corpus size:   {} bytes", report.data_size)?;
    writeln!(stdout, "  Partitions:    {}", report.partitions.len())?;
    writeln!(stdout, "  Retry waves:   {}", report.retry_waves)?;
    writeln!(stdout, "  Index width:   {} bytes", report.index_width)?;
    writeln!(stdout, "  Metadata:      {}", report.meta_path.display())?;

    Ok(())
}

/// Print a fatal error to stderr
///
/// Pipeline errors get a heading naming the failure class; anything else is
/// printed with its cause chain.
pub fn print_error(err: &anyhow::Error, color: bool) -> io::Result<()> {
    let mut stderr = StandardStream::stderr(color_choice(color));

    let heading = match err.downcast_ref::<PipelineError>() {
        Some(PipelineError::Merge { .. }) => "Merge failed",
        Some(PipelineError::FinalValidation { .. }) => "Error: Output table binary invalid",
        _ => "Error",
    };

    stderr.set_color(ColorSpec::new().set_fg(Some(Color::Red)).set_bold(true))?;
    write!(stderr, "{}", heading)?;
    stderr.reset()?;
    writeln!(stderr, ": {:#}", err)?;

    Ok(())
}
