//! Header-addressed view of the portal's listing tables.

use scraper::{ElementRef, Html, Selector};

/// One data row: cell text plus the links found in each cell.
#[derive(Debug, Clone)]
pub(crate) struct Row {
    cells: Vec<String>,
    links: Vec<Vec<String>>,
}

impl Row {
    pub(crate) fn cell(&self, index: usize) -> Option<&str> {
        self.cells.get(index).map(String::as_str)
    }

    pub(crate) fn last_links(&self) -> &[String] {
        self.links.last().map(Vec::as_slice).unwrap_or(&[])
    }

    pub(crate) fn all_links(&self) -> impl Iterator<Item = &str> {
        self.links.iter().flatten().map(String::as_str)
    }
}

#[derive(Debug, Clone)]
pub(crate) struct Table {
    headers: Vec<String>,
    pub(crate) rows: Vec<Row>,
}

impl Table {
    /// First table in the document whose header row has a column for each
    /// alias group in `required`.
    pub(crate) fn find(html: &str, required: &[&[&str]]) -> Option<Self> {
        let document = Html::parse_document(html);
        let table_sel = Selector::parse("table").ok()?;
        let tr_sel = Selector::parse("tr").ok()?;

        document.select(&table_sel).find_map(|table| {
            let own_rows: Vec<ElementRef> = table
                .select(&tr_sel)
                .filter(|tr| nearest_table(tr).map(|t| t.id()) == Some(table.id()))
                .collect();

            let header_row = own_rows.iter().find(|tr| has_child(tr, "th"))?;
            let headers: Vec<String> = child_cells(header_row).map(|c| cell_text(&c)).collect();

            let candidate = Table {
                headers,
                rows: Vec::new(),
            };
            if !required.iter().all(|aliases| candidate.column(aliases).is_some()) {
                return None;
            }

            let rows = own_rows
                .iter()
                .filter(|tr| has_child(tr, "td"))
                .map(|tr| {
                    let cells: Vec<ElementRef> = child_cells(tr).collect();
                    Row {
                        cells: cells.iter().map(cell_text).collect(),
                        links: cells.iter().map(cell_links).collect(),
                    }
                })
                .collect();

            Some(Table { rows, ..candidate })
        })
    }

    /// Index of the column whose header matches one of `aliases`.
    ///
    /// Exact matches (ignoring case and punctuation) win over prefix
    /// matches, so "Invoice #" is preferred over "Invoice Date".
    pub(crate) fn column(&self, aliases: &[&str]) -> Option<usize> {
        let headers: Vec<String> = self.headers.iter().map(|h| normalize(h)).collect();
        let aliases: Vec<String> = aliases.iter().map(|a| normalize(a)).collect();

        headers
            .iter()
            .position(|h| aliases.iter().any(|a| h == a))
            .or_else(|| {
                headers
                    .iter()
                    .position(|h| !h.is_empty() && aliases.iter().any(|a| h.starts_with(a.as_str())))
            })
    }
}

fn normalize(s: &str) -> String {
    s.chars()
        .filter(|c| c.is_alphanumeric())
        .flat_map(char::to_lowercase)
        .collect()
}

fn nearest_table<'a>(el: &ElementRef<'a>) -> Option<ElementRef<'a>> {
    el.ancestors()
        .filter_map(ElementRef::wrap)
        .find(|a| a.value().name() == "table")
}

fn has_child(tr: &ElementRef, name: &str) -> bool {
    tr.children()
        .filter_map(ElementRef::wrap)
        .any(|c| c.value().name() == name)
}

fn child_cells<'a>(tr: &ElementRef<'a>) -> impl Iterator<Item = ElementRef<'a>> {
    tr.children()
        .filter_map(ElementRef::wrap)
        .filter(|c| matches!(c.value().name(), "td" | "th"))
}

pub(crate) fn cell_text(cell: &ElementRef) -> String {
    cell.text()
        .flat_map(str::split_whitespace)
        .collect::<Vec<_>>()
        .join(" ")
}

fn cell_links(cell: &ElementRef) -> Vec<String> {
    let Ok(a_sel) = Selector::parse("a[href]") else {
        return Vec::new();
    };
    cell.select(&a_sel)
        .filter_map(|a| a.value().attr("href"))
        .map(str::to_string)
        .collect()
}
