//! Output formatting and styling module.
//!
//! Everything the operator sees goes through [`OutputFormatter`]: colored
//! status lines, the batch progress bar and the per-category summary.
//! Diagnostic logging goes through `tracing` instead and is off by default.

use colored::*;
use indicatif::{ProgressBar, ProgressStyle};
use std::collections::BTreeMap;

/// Manages all CLI output with consistent styling and formatting.
pub struct OutputFormatter;

impl OutputFormatter {
    /// Prints a success message in green with a checkmark.
    ///
    /// ```no_run
    /// use classifile::output::OutputFormatter;
    /// OutputFormatter::success("report.pdf → documents");
    /// ```
    pub fn success(message: &str) {
        println!("{} {}", "✓".green(), message);
    }

    /// Prints an error message in red with an X mark.
    pub fn error(message: &str) {
        eprintln!("{} {}", "✗".red(), message);
    }

    /// Prints a warning message in yellow with a warning symbol.
    pub fn warning(message: &str) {
        println!("{} {}", "⚠".yellow(), message);
    }

    /// Prints an info message in cyan.
    pub fn info(message: &str) {
        println!("{}", message.cyan());
    }

    /// Prints a regular message without styling.
    pub fn plain(message: &str) {
        println!("{}", message);
    }

    /// Prints a section header.
    pub fn header(header: &str) {
        println!("\n{}", header.bold());
    }

    /// Prints one audit-log entry, dimmed and indented.
    pub fn log_line(entry: &str) {
        println!("   {} {}", "-".dimmed(), entry.dimmed());
    }

    /// Creates a progress bar for a batch of `total` files.
    ///
    /// ```no_run
    /// use classifile::output::OutputFormatter;
    /// let pb = OutputFormatter::create_progress_bar(100);
    /// pb.inc(1);
    /// pb.finish_and_clear();
    /// ```
    pub fn create_progress_bar(total: u64) -> ProgressBar {
        let pb = ProgressBar::new(total);
        let style = ProgressStyle::default_bar()
            .template("{spinner:.cyan} [{bar:40.cyan/blue}] {pos}/{len} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("█▓░");
        pb.set_style(style);
        pb
    }

    /// Prints a summary table with file counts by category.
    ///
    /// ```no_run
    /// use classifile::output::OutputFormatter;
    /// use std::collections::BTreeMap;
    ///
    /// let mut counts = BTreeMap::new();
    /// counts.insert("documents".to_string(), 15);
    /// counts.insert("images".to_string(), 8);
    /// OutputFormatter::summary_table(&counts, 23);
    /// ```
    pub fn summary_table(category_counts: &BTreeMap<String, usize>, total_files: usize) {
        Self::header("SUMMARY");

        let max_category_len = category_counts
            .keys()
            .map(|name| name.len())
            .max()
            .unwrap_or(0)
            .max(8); // "Category"

        println!(
            "{:<width$} | {}",
            "Category".bold(),
            "Files".bold(),
            width = max_category_len
        );
        println!("{}", "-".repeat(max_category_len + 10));

        for (category, count) in category_counts {
            println!(
                "{:<width$} | {} {}",
                category,
                count.to_string().green(),
                plural(*count),
                width = max_category_len
            );
        }

        println!("{}", "-".repeat(max_category_len + 10));
        println!(
            "{:<width$} | {} {}",
            "Total".bold(),
            total_files.to_string().green().bold(),
            plural(total_files),
            width = max_category_len
        );
    }

    /// Prints a dry-run notice message.
    pub fn dry_run_notice(message: &str) {
        println!("{}", format!("[DRY RUN] {}", message).yellow());
    }
}

fn plural(count: usize) -> &'static str {
    if count == 1 { "file" } else { "files" }
}
