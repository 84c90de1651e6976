//! Impact accumulator: environmental-savings attribution for settled records.

use soroban_sdk::{Address, Env, Vec};

use crate::storage;
use crate::types::{ImpactLine, ImpactSnapshot, RecordLine, IMPACT_CREDITED};

/// Compute the itemized savings for a settled cart and add the total to the
/// buyer's cumulative ledger entry.
///
/// Rates are looked up per material with the configured default for unknown
/// materials. The returned snapshot is persisted on the record by the caller
/// and never recomputed; the orchestrator guarantees at most one credit per
/// record by only calling this on the transition into terminal success.
pub fn credit(env: &Env, buyer: &Address, lines: &Vec<RecordLine>) -> ImpactSnapshot {
    let mut impact_lines: Vec<ImpactLine> = Vec::new(env);
    let mut total: i128 = 0;

    for line in lines.iter() {
        let item = match storage::get_item(env, line.item_id) {
            Ok(item) => item,
            // Listings are never deleted, but a missing one must not block
            // settlement of an already verified payment.
            Err(_) => continue,
        };
        let rate = storage::get_savings_rate(env, &item.material);
        let saved = rate * line.quantity as i128;
        total += saved;
        impact_lines.push_back(ImpactLine {
            item_id: line.item_id,
            material: item.material.clone(),
            quantity: line.quantity,
            saved,
        });
    }

    storage::add_impact(env, buyer, total);
    env.events().publish((IMPACT_CREDITED, buyer.clone()), total);

    ImpactSnapshot {
        total,
        lines: impact_lines,
    }
}
