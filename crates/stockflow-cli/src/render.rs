//! Terminal output for cache and progress commands

use comfy_table::Table;
use stockflow_cache::{CacheStats, DataType};
use stockflow_progress::{ProgressRecord, ProgressView, format_duration};

pub fn cache_stats(stats: &CacheStats) -> String {
    let mut tiers = Table::new();
    tiers.set_header(vec!["Tier", "Available", "Entries", "Size (bytes)"]);
    for tier in &stats.tiers {
        tiers.add_row(vec![
            tier.kind.as_str().to_string(),
            if tier.available { "yes" } else { "no" }.to_string(),
            tier.entries.to_string(),
            tier.size_bytes.to_string(),
        ]);
    }

    let mut types = Table::new();
    types.set_header(vec!["Data type", "Entries"]);
    for data_type in DataType::ALL {
        types.add_row(vec![
            data_type.as_str().to_string(),
            stats.count(data_type).to_string(),
        ]);
    }

    format!(
        "{tiers}\n{types}\nTotal: {} entries, {:.2} MB",
        stats.total_entries,
        stats.total_size_mb()
    )
}

pub fn progress_record(record: &ProgressRecord) -> String {
    let mut table = Table::new();
    table.set_header(vec!["Field", "Value"]);
    table.add_row(vec!["Analysis".to_string(), record.analysis_id.clone()]);
    table.add_row(vec!["Status".to_string(), record.status.to_string()]);
    table.add_row(vec![
        "Step".to_string(),
        format!(
            "{}/{} {}",
            record.current_step_index, record.total_steps, record.current_step_name
        ),
    ]);
    if !record.current_step_description.is_empty() {
        table.add_row(vec![
            "Description".to_string(),
            record.current_step_description.clone(),
        ]);
    }
    table.add_row(vec![
        "Progress".to_string(),
        format!("{:.1}%", record.progress_percentage),
    ]);
    table.add_row(vec!["Elapsed".to_string(), format_duration(record.elapsed_time)]);
    table.add_row(vec!["Remaining".to_string(), format_duration(record.remaining_time)]);
    table.add_row(vec![
        "Estimated total".to_string(),
        format_duration(record.estimated_total_time),
    ]);
    table.add_row(vec!["Last message".to_string(), record.last_message.clone()]);
    table.add_row(vec!["Updated".to_string(), record.last_update.to_rfc3339()]);
    table.to_string()
}

pub fn progress_list(records: &[ProgressRecord]) -> String {
    let mut table = Table::new();
    table.set_header(vec!["Analysis", "Status", "Progress", "Elapsed", "Updated"]);
    for record in records {
        table.add_row(vec![
            record.analysis_id.clone(),
            record.status.to_string(),
            format!("{:.1}%", record.progress_percentage),
            format_duration(record.elapsed_time),
            record.last_update.to_rfc3339(),
        ]);
    }
    table.to_string()
}

/// One status line per poll
pub fn progress_line(view: &ProgressView) -> String {
    match view {
        ProgressView::Unavailable { analysis_id } => {
            format!("{analysis_id}: progress unavailable, the analysis may not have started yet")
        }
        ProgressView::Live(record) => format!(
            "[{:>5.1}%] {} ({}/{}) {} | elapsed {} | remaining {}",
            record.progress_percentage,
            record.status,
            record.current_step_index,
            record.total_steps,
            if record.last_message.is_empty() {
                &record.current_step_name
            } else {
                &record.last_message
            },
            format_duration(record.elapsed_time),
            format_duration(record.remaining_time),
        ),
    }
}
