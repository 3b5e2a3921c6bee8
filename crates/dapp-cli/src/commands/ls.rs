//! `dapp image ls` command implementation.
//!
//! Lists every reference in the store, one row per reference.

use dapp_core::error::StoreResult;
use dapp_core::types::Reference;
use dapp_store::ImageStore;

use super::CommandContext;

const NONE: &str = "<none>";

/// One listed application image
#[derive(Debug, Clone, PartialEq)]
pub struct ImageRow {
    pub repository: Option<String>,
    pub tag: Option<String>,
    pub digest: Option<String>,
    pub id: String,
    pub name: String,
}

/// Execute the `dapp image ls` command
pub fn execute(quiet: bool, digests: bool, ctx: &CommandContext) -> StoreResult<()> {
    let store = ctx.image_store()?;
    for line in render(&collect_rows(&store)?, quiet, digests) {
        ctx.output.print(&line);
    }
    Ok(())
}

/// Describe every listed reference
pub fn collect_rows(store: &ImageStore) -> StoreResult<Vec<ImageRow>> {
    store
        .list()?
        .iter()
        .map(|reference| -> StoreResult<ImageRow> {
            let id = store.resolve_id(reference)?;
            let image = store.read(reference)?;
            let (repository, tag, digest) = match reference {
                Reference::Tagged(tagged) => {
                    (Some(tagged.name().familiar()), Some(tagged.tag().to_string()), None)
                },
                Reference::Digested(digested) => {
                    (Some(digested.name().familiar()), None, Some(digested.digest().to_string()))
                },
                Reference::Id(_) => (None, None, None),
            };

            Ok(ImageRow {
                repository,
                tag,
                digest,
                id: id.short().to_string(),
                name: image.bundle().name().unwrap_or_default().to_string(),
            })
        })
        .collect()
}

/// Lay rows out as an aligned table, or bare IDs when quiet
pub fn render(rows: &[ImageRow], quiet: bool, digests: bool) -> Vec<String> {
    if quiet {
        return rows.iter().map(|row| row.id.clone()).collect();
    }

    let mut headers = vec!["REPOSITORY", "TAG"];
    if digests {
        headers.push("DIGEST");
    }
    headers.extend(["APP IMAGE ID", "APP NAME"]);

    let mut table: Vec<Vec<String>> = vec![headers.iter().map(|h| h.to_string()).collect()];
    for row in rows {
        let mut cells = vec![or_none(&row.repository), or_none(&row.tag)];
        if digests {
            cells.push(or_none(&row.digest));
        }
        cells.push(row.id.clone());
        cells.push(row.name.clone());
        table.push(cells);
    }

    let columns = table[0].len();
    let widths: Vec<usize> = (0..columns)
        .map(|column| table.iter().map(|cells| cells[column].len()).max().unwrap_or(0))
        .collect();

    table
        .iter()
        .map(|cells| {
            let mut line = String::new();
            for (column, cell) in cells.iter().enumerate() {
                if column + 1 == columns {
                    line.push_str(cell);
                } else {
                    line.push_str(&format!("{:<width$} ", cell, width = widths[column]));
                }
            }
            line.trim_end().to_string()
        })
        .collect()
}

fn or_none(value: &Option<String>) -> String {
    value.clone().unwrap_or_else(|| NONE.to_string())
}
