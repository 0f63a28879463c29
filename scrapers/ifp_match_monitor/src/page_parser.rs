use scraper::{ElementRef, Html, Selector};
use tracing::{debug, warn};

use crate::{error::ParseError, types::Match};

pub const MATCH_TABLE_SELECTOR: &str = "table#MatchesInProgressDisplay1_dgMatchesProgress";
pub const EVENT_NAME_SELECTOR: &str = "#lblEventName";

// Column layout of the matches-in-progress grid. Cells 2 and 3 carry the
// start time and round, which are not tracked.
const EVENT_COL: usize = 0;
const TABLE_COL: usize = 1;
const TEAM1_COL: usize = 4;
const TEAM1_RECALL_COL: usize = 5;
const TEAM2_COL: usize = 6;
const TEAM2_RECALL_COL: usize = 7;
const FOR_POSITION_COL: usize = 8;
const MIN_CELLS: usize = 9;

/// Reads every match currently in progress, in page order.
///
/// A page without the match grid simply has no live matches. Rows that do not
/// have the expected shape are logged and skipped.
pub fn parse_matches(html: &str) -> Vec<Match> {
    let document = Html::parse_document(html);
    let table_selector = Selector::parse(MATCH_TABLE_SELECTOR).unwrap();
    let row_selector = Selector::parse("tr").unwrap();

    let Some(table) = document.select(&table_selector).next() else {
        debug!("No matches-in-progress table on page");
        return Vec::new();
    };

    let mut matches = Vec::new();
    for (index, row) in table.select(&row_selector).enumerate().skip(1) {
        match parse_row(index, row) {
            Ok(m) => matches.push(m),
            Err(e) => warn!("Skipping malformed match row: {}", e),
        }
    }
    matches
}

/// Text of the tournament name label, or an empty string when the label is absent.
pub fn parse_tournament_name(html: &str) -> String {
    let document = Html::parse_document(html);
    let selector = Selector::parse(EVENT_NAME_SELECTOR).unwrap();
    document
        .select(&selector)
        .next()
        .map(|el| el.text().collect::<String>().trim().to_string())
        .unwrap_or_default()
}

fn parse_row(index: usize, row: ElementRef) -> Result<Match, ParseError> {
    let cells: Vec<ElementRef> = row
        .children()
        .filter_map(ElementRef::wrap)
        .filter(|el| el.value().name() == "td")
        .collect();

    if cells.len() < MIN_CELLS {
        return Err(ParseError::MissingCells {
            row: index,
            found: cells.len(),
            expected: MIN_CELLS,
        });
    }

    let required = |field: &'static str, value: String| {
        if value.is_empty() {
            Err(ParseError::EmptyField { row: index, field })
        } else {
            Ok(value)
        }
    };

    Ok(Match {
        event: cell_text(cells[EVENT_COL]),
        table: required("table", table_number(cells[TABLE_COL]))?,
        team1: required("team1", cell_text(cells[TEAM1_COL]))?,
        team2: required("team2", cell_text(cells[TEAM2_COL]))?,
        for_position: cell_text(cells[FOR_POSITION_COL]),
        team1_recall: indicator_set(cells[TEAM1_RECALL_COL]),
        team2_recall: indicator_set(cells[TEAM2_RECALL_COL]),
    })
}

/// The table number is rendered into an input box; older pages print it as text.
fn table_number(cell: ElementRef) -> String {
    let input_selector = Selector::parse("input").unwrap();
    cell.select(&input_selector)
        .next()
        .and_then(|input| input.value().attr("value"))
        .map(clean_text)
        .filter(|value| !value.is_empty())
        .unwrap_or_else(|| cell_text(cell))
}

fn indicator_set(cell: ElementRef) -> bool {
    cell.text().any(|t| !t.trim().is_empty()) || cell.children().any(|c| c.value().is_element())
}

fn cell_text(cell: ElementRef) -> String {
    clean_text(&cell.text().collect::<String>())
}

/// Drops the raw layout whitespace the upstream markup injects into cell text.
fn clean_text(raw: &str) -> String {
    raw.chars()
        .filter(|c| !matches!(c, '\n' | '\r' | '\t'))
        .collect::<String>()
        .trim()
        .to_string()
}
