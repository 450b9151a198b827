//! HTML parsers for the harvested site
//!
//! This module turns fetched pages into data:
//! - Listing pages: candidate observation links and the "last page" marker
//! - Observation pages: the fields of one `ObservationRecord`
//! - Location pages: location name, country and province
//!
//! Parsing is synchronous; `scraper::Html` never lives across an await.

use crate::state::LinkSet;
use crate::storage::ObservationRecord;
use crate::url::is_candidate_link;
use crate::ValidationError;
use chrono::NaiveDate;
use scraper::{ElementRef, Html, Selector};

/// Links and pagination state found on one listing page
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListingPage {
    /// Candidate links in page order, without duplicates
    pub links: LinkSet,

    /// True when the pagination marks this as the last page
    pub is_last_page: bool,
}

/// Location metadata from the secondary lookup
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LocationInfo {
    pub location: Option<String>,
    pub country: Option<String>,
    pub province: Option<String>,
}

impl LocationInfo {
    /// Names of the fields the location page did not provide
    pub fn missing_fields(&self) -> Vec<&'static str> {
        let mut missing = Vec::new();
        if self.location.is_none() {
            missing.push("location");
        }
        if self.country.is_none() {
            missing.push("country");
        }
        if self.province.is_none() {
            missing.push("province");
        }
        missing
    }
}

/// Fields of an observation page, before the location lookup
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedObservation {
    pub link: String,
    pub url: String,
    pub date: String,
    pub number_text: String,
    pub sex: Option<String>,
    pub life_stage: Option<String>,
    pub location_href: Option<String>,
    pub x_ea: Option<String>,
    pub y_n: Option<String>,
    pub latitude: Option<String>,
    pub longitude: Option<String>,
    pub activity: String,
    pub on_in: Option<String>,
    pub has_comments: bool,
}

impl ParsedObservation {
    /// Completes the record with the location lookup result
    pub fn into_record(self, location: LocationInfo) -> ObservationRecord {
        ObservationRecord {
            link: self.link,
            date: self.date,
            number_text: self.number_text,
            sex: self.sex,
            life_stage: self.life_stage,
            country: location.country,
            location: location.location,
            province: location.province,
            x_ea: self.x_ea,
            y_n: self.y_n,
            latitude: self.latitude,
            longitude: self.longitude,
            activity: self.activity,
            on_in: self.on_in,
            has_comments: self.has_comments,
            url: self.url,
        }
    }
}

/// Parses a listing page
///
/// Candidate links are anchors whose href starts with `link_prefix`. The page
/// is the last one when the pagination contains `li.last.disabled`.
pub fn parse_listing(html: &str, link_prefix: &str) -> ListingPage {
    let document = Html::parse_document(html);
    let mut page = ListingPage::default();

    if let Ok(anchor_selector) = Selector::parse("a[href]") {
        for element in document.select(&anchor_selector) {
            if let Some(href) = element.value().attr("href") {
                if is_candidate_link(href, link_prefix) {
                    page.links.insert(href.trim());
                }
            }
        }
    }

    if let Ok(last_selector) = Selector::parse("ul.pagination li.last.disabled") {
        page.is_last_page = document.select(&last_selector).next().is_some();
    }

    page
}

/// Counts whole-word numeric tokens, as `\b\d+\b` would match them
///
/// Word characters are ASCII letters, digits and underscore. "2 imago 1 larva"
/// has two tokens; "1x" has none.
pub fn count_numeric_tokens(text: &str) -> usize {
    text.split(|c: char| !(c.is_ascii_alphanumeric() || c == '_'))
        .filter(|token| !token.is_empty() && token.chars().all(|c| c.is_ascii_digit()))
        .count()
}

/// Renders the leading `YYYY-MM-DD` token of a date cell as `DD-MM-YY`
pub fn format_observation_date(raw: &str) -> Option<String> {
    let date_part = raw.split_whitespace().next()?;
    NaiveDate::parse_from_str(date_part, "%Y-%m-%d")
        .ok()
        .map(|d| d.format("%d-%m-%y").to_string())
}

/// Whitespace-normalized text content of an element
fn element_text(element: ElementRef<'_>) -> String {
    element
        .text()
        .flat_map(str::split_whitespace)
        .collect::<Vec<_>>()
        .join(" ")
}

fn non_empty(text: String) -> Option<String> {
    if text.is_empty() {
        None
    } else {
        Some(text)
    }
}

/// Finds the `<td>` of the row whose `<th>` reads `label`
fn table_cell<'a>(document: &'a Html, rows_css: &str, label: &str) -> Option<ElementRef<'a>> {
    let row_selector = Selector::parse(rows_css).ok()?;
    let th_selector = Selector::parse("th").ok()?;
    let td_selector = Selector::parse("td").ok()?;

    document
        .select(&row_selector)
        .find(|row| {
            row.select(&th_selector)
                .next()
                .map(|th| element_text(th).eq_ignore_ascii_case(label))
                .unwrap_or(false)
        })
        .and_then(|row| row.select(&td_selector).next())
}

fn detail_cell<'a>(document: &'a Html, label: &str) -> Option<ElementRef<'a>> {
    table_cell(document, "#observation_details tr", label)
}

/// Text of the first child node of a cell (the count before any icon)
fn leading_text(cell: ElementRef<'_>) -> String {
    match cell.children().next() {
        Some(node) => match node.value().as_text() {
            Some(text) => text.trim().to_string(),
            None => ElementRef::wrap(node).map(element_text).unwrap_or_default(),
        },
        None => String::new(),
    }
}

/// Non-empty texts of each child node of a cell, joined by " - "
fn child_texts(cell: ElementRef<'_>) -> Option<String> {
    let parts: Vec<String> = cell
        .children()
        .filter_map(|node| match node.value().as_text() {
            Some(text) => non_empty(text.split_whitespace().collect::<Vec<_>>().join(" ")),
            None => ElementRef::wrap(node).and_then(|el| non_empty(element_text(el))),
        })
        .collect();

    non_empty(parts.join(" - "))
}

fn coordinates(document: &Html, title: &str) -> Option<String> {
    let css = format!(
        "span.teramap-coordinates[title=\"{}\"] span.teramap-coordinates-coords",
        title
    );
    let selector = Selector::parse(&css).ok()?;
    document
        .select(&selector)
        .next()
        .map(element_text)
        .and_then(non_empty)
}

/// Parses an observation page
///
/// Rejects the page when the number cell holds more than one numeric token,
/// or when date, number or activity is missing. Nothing is guessed.
pub fn parse_observation(
    html: &str,
    link: &str,
    url: &str,
) -> Result<ParsedObservation, ValidationError> {
    let document = Html::parse_document(html);
    let missing = |field: &'static str| ValidationError::MissingField {
        link: link.to_string(),
        field,
    };

    let number_cell = detail_cell(&document, "Number");
    if let Some(cell) = number_cell {
        let full_text = element_text(cell);
        if count_numeric_tokens(&full_text) > 1 {
            return Err(ValidationError::AmbiguousCount {
                link: link.to_string(),
                text: full_text,
            });
        }
    }

    let raw_date = detail_cell(&document, "Date")
        .map(element_text)
        .and_then(non_empty)
        .ok_or_else(|| missing("date"))?;
    let date = format_observation_date(&raw_date).ok_or_else(|| ValidationError::InvalidDate {
        link: link.to_string(),
        raw: raw_date.clone(),
    })?;

    let number_text = number_cell
        .map(leading_text)
        .and_then(non_empty)
        .ok_or_else(|| missing("number"))?;

    let activity = detail_cell(&document, "Activity")
        .map(element_text)
        .and_then(non_empty)
        .ok_or_else(|| missing("activity"))?;

    let sex = number_cell.and_then(|cell| {
        let icon_selector = Selector::parse("i[title]").ok()?;
        cell.select(&icon_selector)
            .next()
            .and_then(|icon| icon.value().attr("title"))
            .map(|title| title.trim().to_string())
    });

    let life_stage = detail_cell(&document, "Life stage")
        .map(element_text)
        .and_then(non_empty);

    let location_href = detail_cell(&document, "Location").and_then(|cell| {
        let anchor_selector = Selector::parse("a[href]").ok()?;
        cell.select(&anchor_selector)
            .next()
            .and_then(|a| a.value().attr("href"))
            .map(|href| href.trim().to_string())
            .and_then(non_empty)
    });

    let (x_ea, y_n) = match coordinates(&document, "BD72 / Belgian Lambert 72") {
        Some(text) => {
            let mut parts = text.split_whitespace().map(str::to_string);
            (parts.next(), parts.next())
        }
        None => (None, None),
    };

    let (latitude, longitude) = match coordinates(&document, "WGS 84") {
        Some(text) => {
            let mut parts = text.split(',').map(|s| s.trim().to_string());
            (
                parts.next().and_then(non_empty),
                parts.next().and_then(non_empty),
            )
        }
        None => (None, None),
    };

    let on_in = detail_cell(&document, "On/in").and_then(child_texts);

    let has_comments = Selector::parse("h4 > a[name=\"comments\"]")
        .map(|selector| document.select(&selector).next().is_some())
        .unwrap_or(false);

    Ok(ParsedObservation {
        link: link.to_string(),
        url: url.to_string(),
        date,
        number_text,
        sex,
        life_stage,
        location_href,
        x_ea,
        y_n,
        latitude,
        longitude,
        activity,
        on_in,
        has_comments,
    })
}

/// Parses a location page
pub fn parse_location(html: &str) -> LocationInfo {
    let document = Html::parse_document(html);
    let rows = "table.table-compact tr";

    let linked_text = |label: &str| {
        let anchor_selector = Selector::parse("a").ok()?;
        table_cell(&document, rows, label)?
            .select(&anchor_selector)
            .next()
            .map(element_text)
            .and_then(non_empty)
    };

    LocationInfo {
        location: table_cell(&document, rows, "Name")
            .map(element_text)
            .and_then(non_empty),
        country: linked_text("Country"),
        province: linked_text("Province"),
    }
}
