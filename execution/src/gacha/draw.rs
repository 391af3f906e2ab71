use socialcredit_types::{Item, RarityTable};

use crate::entropy::Entropy;

/// Draws one item from `pool`.
///
/// A tier is sampled by cumulative weight over `[0, total)`, then an item is chosen uniformly
/// among the pool items of that tier. If the pool has nothing of the sampled tier the choice
/// falls back to the whole pool. Returns `None` only for an empty pool.
pub fn draw_item<'a>(
    pool: &[&'a Item],
    table: &RarityTable,
    entropy: &dyn Entropy,
) -> Option<&'a Item> {
    if pool.is_empty() {
        return None;
    }
    let tier = table.tier_at(entropy.below(table.total_weight()));
    let candidates: Vec<&'a Item> = pool
        .iter()
        .copied()
        .filter(|item| item.rarity == tier)
        .collect();
    let candidates = if candidates.is_empty() {
        pool.to_vec()
    } else {
        candidates
    };
    let index = entropy.below(candidates.len() as u64) as usize;
    candidates.get(index).copied()
}
