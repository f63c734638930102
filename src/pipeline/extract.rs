//! Table extraction: positioned text runs → header-keyed records.
//!
//! pdfium reports text as bounded runs, not tables, so table structure is
//! recovered geometrically: runs are clustered into visual rows by vertical
//! midpoint, rows into cells by horizontal gaps, and consecutive multi-cell
//! rows into table blocks. The first row of each block is its header row;
//! every following row becomes one record keyed by those headers. Rows whose
//! cell count does not match the header count are skipped and counted, never
//! fatal — one ragged row must not cost the rest of the statement.
//!
//! ## Memory discipline
//!
//! The page handle (and with it pdfium's per-page caches) is dropped as soon
//! as its rows have been converted; the only state that grows with the
//! document is the record sequence itself. One scratch buffer of text runs
//! is reused across pages, and its capacity is released every
//! `reclaim_every_pages` pages so a single dense page cannot pin a large
//! allocation for the rest of a long document.

use crate::config::IngestConfig;
use crate::error::IngestError;
use crate::record::{ExtractionOutput, ExtractionStats, Record};
use pdfium_render::prelude::*;
use std::cmp::Ordering;
use std::path::Path;
use std::time::Instant;
use tracing::{debug, info, warn};

/// Vertical distance (points) within which two runs share a visual row.
/// Statement rows are one text line apart (≥ 12 pt leading); half a line is
/// comfortably inside one row and outside the next.
const ROW_TOLERANCE: f32 = 4.0;

/// Horizontal gap (points) at or beyond which adjacent runs are separate
/// cells rather than a continued run of the same cell.
const CELL_GAP: f32 = 10.0;

/// One positioned run of text on a page.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct TextRun {
    pub(crate) left: f32,
    pub(crate) right: f32,
    pub(crate) mid_y: f32,
    pub(crate) text: String,
}

/// Extract every table row of `document` into records, pages strictly in
/// document order.
///
/// The returned sequence is finalized (batch, not streamed); its order is
/// page-order then row-order and is stable across repeated extractions of
/// the same document.
///
/// # Errors
/// [`IngestError::UnreadableDocument`] if the document cannot be opened at
/// all. Per-page and per-table failures are logged and skipped.
pub async fn extract_records(
    document: &Path,
    config: &IngestConfig,
) -> Result<ExtractionOutput, IngestError> {
    let path = document.to_path_buf();
    let reclaim_every = config.reclaim_every_pages;

    tokio::task::spawn_blocking(move || extract_blocking(&path, reclaim_every))
        .await
        .map_err(|e| IngestError::Internal(format!("extract task panicked: {e}")))?
}

/// Blocking implementation of the extraction stage.
fn extract_blocking(path: &Path, reclaim_every: usize) -> Result<ExtractionOutput, IngestError> {
    let started = Instant::now();
    let pdfium = Pdfium::default();

    let document =
        pdfium
            .load_pdf_from_file(path, None)
            .map_err(|e| IngestError::UnreadableDocument {
                path: path.to_path_buf(),
                detail: format!("{e:?}"),
            })?;

    let pages = document.pages();
    let page_count = pages.len() as usize;
    debug!(pages = page_count, "extraction started");

    let mut records: Vec<Record> = Vec::new();
    let mut stats = ExtractionStats::default();
    let mut scratch: Vec<TextRun> = Vec::new();

    for index in 0..page_count {
        let page_num = index + 1;
        scratch.clear();

        {
            let page = match pages.get(index as u16) {
                Ok(p) => p,
                Err(e) => {
                    warn!(page = page_num, error = ?e, "page unavailable, skipping");
                    continue;
                }
            };

            let text = match page.text() {
                Ok(t) => t,
                Err(e) => {
                    warn!(page = page_num, error = ?e, "text layer unavailable, skipping page");
                    continue;
                }
            };

            for segment in text.segments().iter() {
                let bounds = segment.bounds();
                let content = segment.text();
                let trimmed = content.trim();
                if trimmed.is_empty() {
                    continue;
                }
                scratch.push(TextRun {
                    left: bounds.left.value,
                    right: bounds.right.value,
                    mid_y: (bounds.top.value + bounds.bottom.value) / 2.0,
                    text: trimmed.to_string(),
                });
            }
            // `page` (and pdfium's caches for it) drop here, before any row
            // is turned into records.
        }

        let rows = rows_of_cells(&mut scratch);
        let before = records.len();
        tables_from_rows(rows, page_num, &mut records, &mut stats);
        debug!(
            page = page_num,
            records = records.len() - before,
            "page consumed"
        );

        stats.pages += 1;
        if stats.pages % reclaim_every == 0 {
            scratch.shrink_to_fit();
        }
    }

    stats.records = records.len();
    stats.duration_ms = started.elapsed().as_millis() as u64;

    info!(
        pages = stats.pages,
        tables = stats.tables,
        records = stats.records,
        skipped_rows = stats.skipped_rows,
        duration_ms = stats.duration_ms,
        "extraction complete"
    );

    Ok(ExtractionOutput { records, stats })
}

/// Cluster positioned runs into visual rows (top of page first), each row a
/// list of cell texts ordered left to right.
///
/// Sorts `runs` in place; the caller's buffer keeps its capacity for reuse.
pub(crate) fn rows_of_cells(runs: &mut Vec<TextRun>) -> Vec<Vec<String>> {
    // PDF y grows upward, so descending mid_y is top-of-page first.
    runs.sort_by(|a, b| {
        b.mid_y
            .partial_cmp(&a.mid_y)
            .unwrap_or(Ordering::Equal)
            .then(a.left.partial_cmp(&b.left).unwrap_or(Ordering::Equal))
    });

    let mut rows = Vec::new();
    let mut i = 0;
    while i < runs.len() {
        let row_y = runs[i].mid_y;
        let mut j = i;
        while j < runs.len() && (row_y - runs[j].mid_y).abs() <= ROW_TOLERANCE {
            j += 1;
        }

        let mut row: Vec<&TextRun> = runs[i..j].iter().collect();
        row.sort_by(|a, b| a.left.partial_cmp(&b.left).unwrap_or(Ordering::Equal));
        rows.push(merge_into_cells(&row));

        i = j;
    }
    rows
}

/// Merge a left-to-right row of runs into cell texts: a gap below
/// [`CELL_GAP`] continues the current cell, anything wider starts a new one.
fn merge_into_cells(row: &[&TextRun]) -> Vec<String> {
    let mut cells: Vec<String> = Vec::new();
    let mut current = String::new();
    let mut current_right = f32::NEG_INFINITY;

    for run in row {
        if !current.is_empty() && run.left - current_right < CELL_GAP {
            // Continued run of the same cell; restore the space pdfium split on.
            if run.left - current_right > 1.0 {
                current.push(' ');
            }
            current.push_str(&run.text);
        } else {
            if !current.is_empty() {
                cells.push(std::mem::take(&mut current));
            }
            current.push_str(&run.text);
        }
        current_right = current_right.max(run.right);
    }
    if !current.is_empty() {
        cells.push(current);
    }
    cells
}

/// Segment a page's rows into table blocks and convert them to records.
///
/// A block is a maximal run of consecutive rows with two or more cells;
/// rows with fewer (titles, prose, footers) break blocks. The first row of
/// a block is its header row. A header-only block yields no records.
pub(crate) fn tables_from_rows(
    rows: Vec<Vec<String>>,
    page_num: usize,
    records: &mut Vec<Record>,
    stats: &mut ExtractionStats,
) {
    let mut block: Vec<Vec<String>> = Vec::new();

    // Trailing empty row acts as a flush sentinel for a table that runs to
    // the bottom of the page.
    for row in rows.into_iter().chain(std::iter::once(Vec::new())) {
        if row.len() >= 2 {
            block.push(row);
            continue;
        }
        flush_block(&mut block, page_num, records, stats);
    }
}

fn flush_block(
    block: &mut Vec<Vec<String>>,
    page_num: usize,
    records: &mut Vec<Record>,
    stats: &mut ExtractionStats,
) {
    if block.is_empty() {
        return;
    }
    if block.len() == 1 {
        debug!(page = page_num, "header-only table block, no records");
        block.clear();
        return;
    }

    stats.tables += 1;
    let mut rows = std::mem::take(block).into_iter();
    let Some(headers) = rows.next() else {
        return;
    };

    for row in rows {
        if row.len() != headers.len() {
            stats.skipped_rows += 1;
            warn!(
                page = page_num,
                cells = row.len(),
                headers = headers.len(),
                "row/header length mismatch, skipping row"
            );
            continue;
        }
        records.push(headers.iter().cloned().zip(row).collect());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run(left: f32, right: f32, mid_y: f32, text: &str) -> TextRun {
        TextRun {
            left,
            right,
            mid_y,
            text: text.to_string(),
        }
    }

    #[test]
    fn runs_cluster_into_rows_by_vertical_midpoint() {
        let mut runs = vec![
            run(72.0, 100.0, 680.0, "2024-01-01"),
            run(72.0, 95.0, 700.0, "Date"),
            run(300.0, 350.0, 700.5, "Amount"),
            run(300.0, 330.0, 679.5, "100.00"),
        ];
        let rows = rows_of_cells(&mut runs);
        assert_eq!(
            rows,
            vec![
                vec!["Date".to_string(), "Amount".to_string()],
                vec!["2024-01-01".to_string(), "100.00".to_string()],
            ]
        );
    }

    #[test]
    fn adjacent_runs_merge_into_one_cell() {
        // "Completion" and "Time" split by pdfium into two runs 3 pt apart.
        let mut runs = vec![
            run(72.0, 130.0, 700.0, "Completion"),
            run(133.0, 160.0, 700.0, "Time"),
            run(300.0, 340.0, 700.0, "Details"),
        ];
        let rows = rows_of_cells(&mut runs);
        assert_eq!(
            rows,
            vec![vec!["Completion Time".to_string(), "Details".to_string()]]
        );
    }

    #[test]
    fn header_and_rows_become_records() {
        let rows = vec![
            vec!["Date".into(), "Amount".into(), "Details".into()],
            vec!["2024-01-01".into(), "100".into(), "KPLC".into()],
            vec!["2024-01-02".into(), "250".into(), "RENT".into()],
        ];
        let mut records = Vec::new();
        let mut stats = ExtractionStats::default();
        tables_from_rows(rows, 1, &mut records, &mut stats);

        assert_eq!(stats.tables, 1);
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].get("Date"), Some("2024-01-01"));
        assert_eq!(records[0].get("Amount"), Some("100"));
        assert_eq!(records[1].get("Details"), Some("RENT"));
        let headers: Vec<&str> = records[0].headers().collect();
        assert_eq!(headers, vec!["Date", "Amount", "Details"]);
    }

    #[test]
    fn length_mismatch_skips_row_without_aborting() {
        let rows = vec![
            vec!["A".into(), "B".into(), "C".into()],
            vec!["1".into(), "2".into(), "3".into()],
            vec!["1".into(), "2".into()], // ragged, skipped
            vec!["4".into(), "5".into(), "6".into()],
        ];
        let mut records = Vec::new();
        let mut stats = ExtractionStats::default();
        tables_from_rows(rows, 3, &mut records, &mut stats);

        assert_eq!(records.len(), 2);
        assert_eq!(stats.skipped_rows, 1);
        assert_eq!(records[1].get("A"), Some("4"));
    }

    #[test]
    fn single_cell_rows_break_table_blocks() {
        let rows = vec![
            vec!["MONTHLY STATEMENT".into()], // title, no table
            vec!["Date".into(), "In".into()],
            vec!["2024-01-01".into(), "10".into()],
            vec!["Page 1 of 9".into()], // footer breaks the block
            vec!["Type".into(), "Total".into()],
            vec!["SEND MONEY".into(), "1,000".into()],
        ];
        let mut records = Vec::new();
        let mut stats = ExtractionStats::default();
        tables_from_rows(rows, 1, &mut records, &mut stats);

        assert_eq!(stats.tables, 2);
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].get("Date"), Some("2024-01-01"));
        assert_eq!(records[1].get("Type"), Some("SEND MONEY"));
        // Headers differ between the two tables on the same page.
        assert_eq!(records[1].get("Date"), None);
    }

    #[test]
    fn header_only_block_and_prose_page_yield_nothing() {
        let mut records = Vec::new();
        let mut stats = ExtractionStats::default();

        tables_from_rows(
            vec![vec!["Date".into(), "Amount".into()]],
            1,
            &mut records,
            &mut stats,
        );
        tables_from_rows(
            vec![vec!["Just a paragraph".into()]],
            2,
            &mut records,
            &mut stats,
        );

        assert!(records.is_empty());
        assert_eq!(stats.tables, 0);
        assert_eq!(stats.skipped_rows, 0);
    }

    #[test]
    fn repeated_extraction_order_is_stable() {
        let build = || {
            let mut runs = vec![
                run(72.0, 95.0, 700.0, "Date"),
                run(300.0, 350.0, 700.0, "Amount"),
                run(72.0, 100.0, 680.0, "2024-01-01"),
                run(300.0, 330.0, 680.0, "7.00"),
                run(72.0, 100.0, 660.0, "2024-01-02"),
                run(300.0, 330.0, 660.0, "9.00"),
            ];
            let rows = rows_of_cells(&mut runs);
            let mut records = Vec::new();
            let mut stats = ExtractionStats::default();
            tables_from_rows(rows, 1, &mut records, &mut stats);
            records
        };
        assert_eq!(build(), build());
    }
}
