//! Result aggregation and console rendering.

use owo_colors::OwoColorize;

use crate::resolver::DependencyRecord;

/// The aggregated outcome of one check run.
#[derive(Debug, Clone)]
pub struct Summary {
    /// Total dependency edges observed across the transitive graph.
    pub total: usize,
    /// Declarations not proven used, including synthetic dynamic records.
    pub unused: Vec<DependencyRecord>,
    /// Count of genuinely unused declarations. Dynamic-unresolved records
    /// stay in `unused` for display but are excluded from this count.
    pub unused_count: usize,
    /// Every dev-declared dependency, reported separately regardless of
    /// whether it turned out to be used.
    pub dev: Vec<DependencyRecord>,
}

impl Summary {
    /// Partitions the resolved records into the summary shape.
    pub fn from_records(records: Vec<DependencyRecord>, total: usize) -> Self {
        let dev: Vec<DependencyRecord> =
            records.iter().filter(|r| r.is_dev).cloned().collect();
        let unused: Vec<DependencyRecord> = records
            .into_iter()
            .filter(|r| !r.state.counts_as_used() && !r.is_dev)
            .collect();
        let dynamic_count = unused.iter().filter(|r| r.is_dynamic_unresolved()).count();
        let unused_count = unused.len() - dynamic_count;

        Summary {
            total,
            unused,
            unused_count,
            dev,
        }
    }

    /// The declarations confirmed unused, without the dynamic records.
    pub fn confirmed_unused(&self) -> impl Iterator<Item = &DependencyRecord> {
        self.unused.iter().filter(|r| !r.is_dynamic_unresolved())
    }

    /// The synthetic records for imports that could not be analyzed.
    pub fn dynamic_unresolved(&self) -> impl Iterator<Item = &DependencyRecord> {
        self.unused.iter().filter(|r| r.is_dynamic_unresolved())
    }

    /// Returns true when nothing needs the user's attention.
    pub fn is_clean(&self) -> bool {
        self.unused.is_empty()
    }
}

/// Flags controlling how the summary is rendered.
#[derive(Debug, Default, Clone, Copy)]
pub struct DisplayOptions {
    pub verbose: bool,
    pub silence: bool,
    pub pnpm: bool,
    pub has_ignore_config: bool,
}

/// Renders the check results to stdout.
pub fn render(summary: &Summary, options: DisplayOptions) {
    println!();
    println!("✨ {}", "Check Results".bold());
    println!("{}", "═".repeat(50).dimmed());
    println!(
        "Checked {} dependency references in the lockfile.",
        summary.total.to_string().cyan()
    );

    if summary.unused_count == 0 {
        println!("{} No unused dependencies found.", "✓".green().bold());
    } else {
        println!(
            "{} Found {} unused {}:",
            "⚠".yellow().bold(),
            summary.unused_count.to_string().yellow().bold(),
            plural(summary.unused_count, "dependency", "dependencies")
        );
        for record in summary.confirmed_unused() {
            println!("  - {} {}", record.name.red(), format!("@{}", record.version).dimmed());
        }
    }

    let dynamic: Vec<_> = summary.dynamic_unresolved().collect();
    if !dynamic.is_empty() {
        println!();
        println!(
            "{} {} dynamic {} could not be resolved statically:",
            "⚠".yellow().bold(),
            dynamic.len().to_string().yellow(),
            plural(dynamic.len(), "import", "imports")
        );
        for record in dynamic {
            if let Some(call_text) = &record.call_text {
                println!("  - {}", call_text.dimmed());
            }
        }
    }

    if options.verbose && !summary.dev.is_empty() {
        println!();
        println!(
            "{} {} (reported separately, never counted as unused):",
            summary.dev.len().to_string().cyan(),
            plural(summary.dev.len(), "devDependency", "devDependencies")
        );
        for record in &summary.dev {
            let usage = if record.state.counts_as_used() {
                "used".green().to_string()
            } else {
                "unused".dimmed().to_string()
            };
            println!(
                "  - {} {} ({})",
                record.name,
                format!("@{}", record.version).dimmed(),
                usage
            );
        }
    }

    if summary.unused_count > 0 && !options.has_ignore_config && !options.silence {
        println!();
        println!(
            "{}",
            "Hint: false positives can be excluded with --ignore-dep or a depscope.config.json."
                .dimmed()
        );
    }

    if options.pnpm && options.verbose {
        println!("{}", "PNPM support enabled.".dimmed());
    }
    println!();
}

fn plural<'a>(count: usize, singular: &'a str, plural: &'a str) -> &'a str {
    if count == 1 {
        singular
    } else {
        plural
    }
}
