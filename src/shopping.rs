//! Shopping list built from the recipes in a user's cart.

use std::collections::BTreeMap;

use crate::{recipes::repo_types::CartLine, state::AppState};

pub const HEADER: &str = "Shopping list:";
pub const FILENAME: &str = "shopping_list.txt";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShoppingItem {
    pub name: String,
    pub measurement_unit: String,
    pub total: i64,
}

/// Sums amounts per (name, unit). Items come out ordered by name, then unit.
pub fn aggregate(lines: impl IntoIterator<Item = CartLine>) -> Vec<ShoppingItem> {
    let mut totals: BTreeMap<(String, String), i64> = BTreeMap::new();
    for line in lines {
        *totals
            .entry((line.name, line.measurement_unit))
            .or_default() += i64::from(line.amount);
    }
    totals
        .into_iter()
        .map(|((name, measurement_unit), total)| ShoppingItem {
            name,
            measurement_unit,
            total,
        })
        .collect()
}

pub fn render(items: &[ShoppingItem]) -> String {
    let mut out = String::from(HEADER);
    for item in items {
        out.push('\n');
        out.push_str(&format!(
            "{} ({}) - {}",
            item.name, item.measurement_unit, item.total
        ));
    }
    out
}

pub async fn shopping_list(st: &AppState, user_id: i64) -> anyhow::Result<String> {
    let lines = st.recipes.cart_lines(user_id).await?;
    Ok(render(&aggregate(lines)))
}
