//! Plain-text tables for list outputs.
//!
//! The main entry point is [`Table::from_iter`], which turns a slice of rows and a set of column
//! accessors into a [`Table`] that renders through [`Display`].
use std::{fmt::Display, iter};

/// Table representation.
///
/// Every column is left aligned and padded to the widest cell in that column plus a gutter.
pub struct Table {
    pub header: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

/// Column definition: a header and an accessor producing the cell for one item.
pub type TableColumn<S, T> = (S, fn(&T) -> String);

const GUTTER: usize = 2;

impl Table {
    pub fn new(header: Vec<String>, rows: Vec<Vec<String>>) -> Self {
        Self { header, rows }
    }

    /// Create a new table from an iterator of items.
    ///
    /// # Arguments
    ///
    /// * `iter` - The iterator of items.
    /// * `columns` - The columns of the table.
    pub fn from_iter<'a, S, Iter, Item>(iter: Iter, columns: &[TableColumn<S, Item>]) -> Self
    where
        S: Display,
        Iter: IntoIterator<Item = &'a Item>,
        Item: 'a,
    {
        let header = columns.iter().map(|(name, _)| name.to_string()).collect();
        let rows = iter
            .into_iter()
            .map(|item| columns.iter().map(|(_, f)| f(item)).collect())
            .collect();

        Self::new(header, rows)
    }

    fn column_widths(&self) -> Vec<usize> {
        let mut widths = vec![0; self.header.len()];
        for row in iter::once(&self.header).chain(self.rows.iter()) {
            for (width, cell) in widths.iter_mut().zip(row) {
                *width = (*width).max(cell.chars().count());
            }
        }
        widths
    }
}

impl Display for Table {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let widths = self.column_widths();
        let last = widths.len().saturating_sub(1);

        for row in iter::once(&self.header).chain(self.rows.iter()) {
            for (index, (cell, width)) in row.iter().zip(widths.iter()).enumerate() {
                // the last column is not padded, no trailing whitespace
                if index == last {
                    write!(f, "{cell}")?;
                } else {
                    write!(f, "{:<width$}", cell, width = width + GUTTER)?;
                }
            }
            writeln!(f)?;
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct ImageRow {
        publisher: String,
        offer: String,
        sku: String,
    }

    fn row(publisher: &str, offer: &str, sku: &str) -> ImageRow {
        ImageRow {
            publisher: publisher.to_string(),
            offer: offer.to_string(),
            sku: sku.to_string(),
        }
    }

    const COLUMNS: &[TableColumn<&str, ImageRow>] = &[
        ("Publisher", |r: &ImageRow| r.publisher.clone()),
        ("Offer", |r: &ImageRow| r.offer.clone()),
        ("Sku", |r: &ImageRow| r.sku.clone()),
    ];

    #[test]
    fn test_columns_are_padded_to_widest_cell() {
        let rows = vec![
            row("Canonical", "UbuntuServer", "18.04-LTS"),
            row("Debian", "debian-11", "11"),
        ];

        let output = Table::from_iter(rows.iter(), COLUMNS).to_string();

        assert_eq!(
            output,
            "Publisher  Offer         Sku\n\
             Canonical  UbuntuServer  18.04-LTS\n\
             Debian     debian-11     11\n"
        );
    }

    #[test]
    fn test_empty_table_prints_header_only() {
        let rows: Vec<ImageRow> = vec![];

        let output = Table::from_iter(rows.iter(), COLUMNS).to_string();

        assert_eq!(output, "Publisher  Offer  Sku\n");
    }

    #[test]
    fn test_single_column() {
        let rows = vec![row("OpenLogic", "CentOS", "7.5")];
        let columns: &[TableColumn<&str, ImageRow>] = &[("Offer", |r: &ImageRow| r.offer.clone())];

        let output = Table::from_iter(rows.iter(), columns).to_string();

        assert_eq!(output, "Offer\nCentOS\n");
    }
}
