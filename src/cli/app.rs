//! CLI module for the flomokit application
//!
//! This module turns parsed commands into API calls, analysis, exports and
//! terminal output.
use std::path::{Path, PathBuf};

use chrono::{DateTime, FixedOffset, NaiveDate, TimeZone};
use log::{info, warn};

use crate::{
    analyze_notes, export_csv, export_graph, export_json, line_preview, missing_tags,
    parse_tags, tag_hierarchy, AnalysisReport, ApiClient, Commands, Config,
    FetchOutcome, FlomoError, GraphOptions, NoteRecord, Result, SearchFilter, SeedReport,
};

/// File name of the row export written by `fetch`.
pub const CSV_EXPORT: &str = "flomo_export.csv";

/// File name of the document export written by `fetch`.
pub const JSON_EXPORT: &str = "flomo_export.json";

/// CLI Application handler - processes CLI commands against the API client
pub struct App {
    /// The signed API client
    client: ApiClient,

    /// Application configuration
    config: Config,

    /// Whether to display verbose output
    verbose: bool,
}

impl App {
    /// Create a new CLI application with the given configuration
    pub fn new(config: Config, verbose: bool) -> Result<Self> {
        let client = ApiClient::new(config.clone())?;
        Ok(Self {
            client,
            config,
            verbose,
        })
    }

    /// Run the CLI application with the given command
    pub async fn run(&self, command: Commands) -> Result<()> {
        match command {
            Commands::Fetch {
                output,
                limit,
                no_export,
            } => self.handle_fetch(output, limit, no_export).await,

            Commands::Search {
                query,
                max,
                include,
                exclude,
                with_files,
                no_files,
                from,
                to,
                json,
            } => {
                let has_files = match (with_files, no_files) {
                    (true, _) => Some(true),
                    (_, true) => Some(false),
                    _ => None,
                };
                let offset = self.config.tz_offset()?;
                let filter = SearchFilter {
                    include_tags: parse_tags(include),
                    exclude_tags: parse_tags(exclude),
                    has_files,
                    date_from: from
                        .map(|d| parse_day(&d, false, offset))
                        .transpose()?,
                    date_to: to
                        .map(|d| parse_day(&d, true, offset))
                        .transpose()?,
                };
                self.handle_search(&query, max, filter, json).await
            }

            Commands::Recommend {
                slug,
                threshold,
                no_same_tag,
            } => self.handle_recommend(&slug, threshold, no_same_tag).await,

            Commands::Graph {
                sample,
                threshold,
                no_same_tag,
                output,
            } => {
                self.handle_graph(sample, threshold, no_same_tag, &output)
                    .await
            }

            Commands::Tags {
                check_missing,
                json,
            } => self.handle_tags(check_missing, json).await,

            Commands::Files { ids } => self.handle_files(&ids).await,
        }
    }

    fn graph_options(&self, threshold: Option<f64>, no_same_tag: bool) -> GraphOptions {
        let mut options = GraphOptions::from_config(&self.config);
        if let Some(threshold) = threshold {
            options.threshold = threshold;
        }
        options.no_same_tag = no_same_tag;
        options
    }

    async fn handle_fetch(&self, output: PathBuf, limit: Option<usize>, no_export: bool) -> Result<()> {
        println!("Fetching notes...");
        let notes = self.accept_partial(self.client.fetch_notes(limit).await)?;
        println!("Fetched {} notes", notes.len());

        let report = analyze_notes(&notes, &self.config.web_url);
        self.print_analysis(&report);

        if !no_export {
            export_csv(&report, &output.join(CSV_EXPORT))?;
            export_json(&report, &output.join(JSON_EXPORT))?;
            println!(
                "\nExported to {} and {}",
                output.join(CSV_EXPORT).display(),
                output.join(JSON_EXPORT).display()
            );
        }
        Ok(())
    }

    async fn handle_search(
        &self,
        query: &str,
        max: usize,
        filter: SearchFilter,
        json: bool,
    ) -> Result<()> {
        let hits = self.accept_partial(self.client.search_notes(query, max).await)?;
        let records: Vec<NoteRecord> = hits
            .iter()
            .map(|note| NoteRecord::from_note(note, &self.config.web_url))
            .collect();
        let total = records.len();
        let records = filter.apply(records, self.config.tz_offset()?);
        info!("Search kept {} of {} hits", records.len(), total);

        if json {
            println!("{}", serde_json::to_string_pretty(&records)?);
            return Ok(());
        }

        println!(
            "{} of {} hits for '{}'",
            console::style(records.len()).bold(),
            total,
            query
        );
        self.display_records(&records);
        Ok(())
    }

    async fn handle_recommend(
        &self,
        slug: &str,
        threshold: Option<f64>,
        no_same_tag: bool,
    ) -> Result<()> {
        let options = self.graph_options(threshold, no_same_tag);
        let report = self.client.analyze_recommendations(slug, &options).await?;
        self.print_seed_report(&report, options.threshold);
        Ok(())
    }

    async fn handle_graph(
        &self,
        sample: usize,
        threshold: Option<f64>,
        no_same_tag: bool,
        output: &Path,
    ) -> Result<()> {
        let seeds = self.accept_partial(self.client.fetch_notes(Some(sample)).await)?;
        if seeds.is_empty() {
            println!("No notes to analyze");
            return Ok(());
        }

        let options = self.graph_options(threshold, no_same_tag);
        println!(
            "Looking up recommendations for {} notes (threshold {})...",
            seeds.len(),
            options.threshold
        );
        let graph = self.client.build_graph(&seeds, &options).await;

        for seed in graph.seeds.iter().filter(|s| s.has_cluster()).take(3) {
            let node = graph.node(&seed.slug);
            println!("\nCluster around {}", console::style(&seed.slug).bold());
            if let Some(preview) = node.and_then(|n| n.content_preview.as_deref()) {
                println!("  {}", line_preview(preview, 80));
            }
            let related = graph.edges.iter().filter(|e| e.source == seed.slug).count();
            println!("  Related notes: {}", related);
        }

        let document = export_graph(&graph, output)?;
        let summary = graph.summary();
        println!(
            "\nGraph: {} nodes, {} edges, {} clusters, {} failed lookups",
            document.metadata.total_nodes,
            document.metadata.total_edges,
            summary.clusters,
            summary.failed_seeds
        );
        println!("Exported to {}", output.display());
        Ok(())
    }

    async fn handle_tags(&self, check_missing: bool, json: bool) -> Result<()> {
        let tags = self.accept_partial(self.client.fetch_tags(None).await)?;
        let hierarchy = tag_hierarchy(&tags);

        let missing = if check_missing {
            let notes =
                self.accept_partial(self.client.fetch_notes(Some(self.config.page_size)).await)?;
            Some(missing_tags(&notes, &tags))
        } else {
            None
        };

        if json {
            let document = serde_json::json!({
                "tags": tags,
                "hierarchy": hierarchy,
                "missing": missing,
            });
            println!("{}", serde_json::to_string_pretty(&document)?);
            return Ok(());
        }

        println!("{} tags", console::style(tags.len()).bold());
        if hierarchy.is_empty() {
            println!("No hierarchical tags found");
        } else {
            let max_depth = hierarchy.iter().map(|h| h.depth).max().unwrap_or(0);
            println!(
                "{} hierarchical tags (max depth {}):",
                hierarchy.len(),
                max_depth
            );
            for entry in hierarchy.iter().take(10) {
                println!(
                    "  {} -> {}",
                    console::style(&entry.tag).cyan(),
                    entry.levels.join(" / ")
                );
            }
        }

        if let Some(missing) = missing {
            if missing.is_empty() {
                println!("Every tag used on recent notes is in the tag list");
            } else {
                println!("{} tags used on notes but missing from the list:", missing.len());
                for tag in missing.iter().take(20) {
                    println!("  #{}", tag);
                }
            }
        }
        Ok(())
    }

    async fn handle_files(&self, ids: &[String]) -> Result<()> {
        let files = self.client.file_details(ids).await?;
        for file in &files {
            println!(
                "{} ({} bytes)",
                console::style(file.name.as_deref().unwrap_or("<unnamed>")).bold(),
                file.size.map_or_else(|| "?".to_string(), |s| s.to_string())
            );
            if let Some(url) = &file.url {
                println!("  {}", url);
            }
        }
        Ok(())
    }

    /// Keeps partial results of an interrupted walk; fails only when nothing came back.
    fn accept_partial<T>(&self, outcome: FetchOutcome<T>) -> Result<Vec<T>> {
        match outcome.error {
            Some(e) if outcome.items.is_empty() => Err(e),
            Some(e) => {
                warn!("Walk interrupted after {} items: {}", outcome.items.len(), e);
                eprintln!(
                    "{} stopped early after {} items: {}",
                    console::style("warning:").yellow(),
                    outcome.items.len(),
                    e
                );
                Ok(outcome.items)
            }
            None => Ok(outcome.items),
        }
    }

    fn separator(&self) -> String {
        let term_width = terminal_size::terminal_size()
            .map(|(w, _)| w.0 as usize)
            .unwrap_or(80);
        "-".repeat(term_width.min(60))
    }

    fn print_analysis(&self, report: &AnalysisReport) {
        println!("\n{}", self.separator());
        println!("{}", console::style("flomo analysis").bold());
        println!("{}", self.separator());
        println!("Notes:              {}", report.total_notes);
        println!("Characters:         {}", report.total_words);
        println!("Average per note:   {:.2}", report.avg_words_per_note);
        if let Some(range) = &report.date_range {
            println!("Date range:         {} to {}", range.earliest, range.latest);
        }

        if !report.top_tags.is_empty() {
            println!("\nTop tags:");
            for entry in report.top_tags.iter().take(10) {
                println!("  {} {}", console::style(format!("#{}", entry.key)).cyan(), entry.count);
            }
        }

        if !report.monthly_distribution.is_empty() {
            println!("\nBusiest months:");
            for entry in report.monthly_distribution.iter().take(10) {
                println!("  {}: {}", entry.key, entry.count);
            }
        }

        let mut latest: Vec<&NoteRecord> = report.notes.iter().collect();
        latest.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        println!("\nLatest notes:");
        for (i, record) in latest.iter().take(5).enumerate() {
            println!(
                "  {}. [{}] {}",
                i + 1,
                record.created_at,
                line_preview(&record.plain_text, 100)
            );
        }
    }

    fn print_seed_report(&self, report: &SeedReport, threshold: f64) {
        let Some(stats) = &report.stats else {
            println!("No recommendations for {}", report.slug);
            return;
        };

        println!("Recommendations for {}", console::style(&report.slug).bold());
        println!("  Total:            {}", stats.total);
        println!("  Similarity range: {:.3} - {:.3}", stats.min, stats.max);
        println!("  Mean similarity:  {:.3}", stats.mean);
        println!("  Above {}:        {}", threshold, stats.high_similarity_count);
        if !stats.top_tags.is_empty() {
            let tags: Vec<String> = stats
                .top_tags
                .iter()
                .take(5)
                .map(|e| format!("#{}", e.key))
                .collect();
            println!("  Top tags:         {}", console::style(tags.join(" ")).cyan());
        }

        if self.verbose {
            for rec in &report.recommendations {
                println!(
                    "  {:.3} {} {}",
                    rec.similarity,
                    rec.memo.slug,
                    line_preview(&crate::normalize(&rec.memo.content).plain_text, 60)
                );
            }
        }
    }

    fn display_records(&self, records: &[NoteRecord]) {
        let separator = self.separator();
        for (i, record) in records.iter().enumerate() {
            if i > 0 {
                println!("{}", separator);
            }

            println!("[{}] {}", record.created_at, record.url);
            if !record.tags.is_empty() {
                let tags = record
                    .tags
                    .iter()
                    .map(|tag| format!("#{}", tag))
                    .collect::<Vec<_>>()
                    .join(" ");
                println!("Tags: {}", console::style(tags).cyan());
            }
            if record.has_files {
                println!("Files: {}", record.files.len());
            }

            if self.verbose {
                println!("\n{}", record.markdown);
            } else {
                let preview = line_preview(&record.plain_text, 80);
                if !preview.is_empty() {
                    println!("\n{}", preview);
                }
            }
        }
    }
}

/// Start (or end, with `end_of_day`) of a `YYYY-MM-DD` day in `offset`.
fn parse_day(value: &str, end_of_day: bool, offset: FixedOffset) -> Result<DateTime<FixedOffset>> {
    let invalid = || FlomoError::ApplicationError {
        message: format!("Invalid date '{}', expected YYYY-MM-DD", value),
    };
    let day = NaiveDate::parse_from_str(value, "%Y-%m-%d").map_err(|_| invalid())?;
    let moment = if end_of_day {
        day.and_hms_opt(23, 59, 59)
    } else {
        day.and_hms_opt(0, 0, 0)
    }
    .ok_or_else(invalid)?;

    offset
        .from_local_datetime(&moment)
        .single()
        .ok_or_else(invalid)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_day_bounds() {
        let offset = FixedOffset::east_opt(8 * 3600).unwrap();
        let from = parse_day("2024-02-01", false, offset).unwrap();
        let to = parse_day("2024-02-01", true, offset).unwrap();
        assert_eq!(to.timestamp() - from.timestamp(), 86_399);
        assert!(parse_day("02/01/2024", false, offset).is_err());
    }
}
