//! Aggregate statistics over the session's classifications

use std::collections::HashMap;
use std::fmt::Write;

use crate::models::{format_confidence, ClassificationResult, Priority};

/// Width of the longest bar in a chart
pub const BAR_WIDTH: usize = 30;

pub const EMPTY_MESSAGE: &str = "No data available. Classify some emails first.";

#[derive(Debug, Clone, PartialEq)]
pub struct Stats {
    pub total: usize,
    pub high_priority: usize,
    pub categories: usize,
    pub avg_confidence: Option<f64>,
    /// (category, count), most frequent first, ties by name
    pub category_counts: Vec<(String, usize)>,
    /// High, Medium, Low always; Unknown only when present
    pub priority_counts: Vec<(Priority, usize)>,
}

impl Stats {
    pub fn from_results(results: &[ClassificationResult]) -> Self {
        let mut by_category: HashMap<&str, usize> = HashMap::new();
        let mut by_priority: HashMap<Priority, usize> = HashMap::new();

        for result in results {
            *by_category.entry(result.category.as_str()).or_insert(0) += 1;
            *by_priority.entry(result.priority).or_insert(0) += 1;
        }

        let mut category_counts: Vec<(String, usize)> = by_category
            .into_iter()
            .map(|(name, count)| (name.to_string(), count))
            .collect();
        category_counts.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));

        let priority_counts = Priority::ALL
            .iter()
            .map(|p| (*p, by_priority.get(p).copied().unwrap_or(0)))
            .filter(|(p, count)| *p != Priority::Unknown || *count > 0)
            .collect();

        let avg_confidence = if results.is_empty() {
            None
        } else {
            Some(results.iter().map(|r| r.confidence).sum::<f64>() / results.len() as f64)
        };

        Self {
            total: results.len(),
            high_priority: by_priority.get(&Priority::High).copied().unwrap_or(0),
            categories: category_counts.len(),
            avg_confidence,
            category_counts,
            priority_counts,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.total == 0
    }

    /// Summary metrics followed by the category and priority charts
    pub fn render(&self) -> String {
        if self.is_empty() {
            return EMPTY_MESSAGE.to_string();
        }

        let mut out = String::new();
        let _ = writeln!(out, "Total Emails:     {}", self.total);
        let _ = writeln!(out, "High Priority:    {}", self.high_priority);
        let _ = writeln!(out, "Categories:       {}", self.categories);
        let _ = writeln!(
            out,
            "Avg Confidence:   {}",
            self.avg_confidence
                .map(format_confidence)
                .unwrap_or_else(|| "N/A".to_string())
        );
        out.push('\n');

        out.push_str(&bar_chart("Email Categories", &self.category_counts));
        out.push('\n');

        let priorities: Vec<(String, usize)> = self
            .priority_counts
            .iter()
            .map(|(p, count)| (p.to_string(), *count))
            .collect();
        out.push_str(&bar_chart("Priority Distribution", &priorities));

        out
    }
}

/// Number of bar cells for `count`, scaled so `max` fills `BAR_WIDTH`
pub fn bar_len(count: usize, max: usize) -> usize {
    if max == 0 || count == 0 {
        return 0;
    }
    ((count * BAR_WIDTH + max / 2) / max).max(1)
}

/// Horizontal bar chart with labels padded to a common width
pub fn bar_chart(title: &str, rows: &[(String, usize)]) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "{}", title);

    let max = rows.iter().map(|(_, count)| *count).max().unwrap_or(0);
    let label_width = rows.iter().map(|(label, _)| label.chars().count()).max().unwrap_or(0);

    for (label, count) in rows {
        let _ = writeln!(
            out,
            "  {:<width$} | {} {}",
            label,
            "█".repeat(bar_len(*count, max)),
            count,
            width = label_width
        );
    }

    out
}
