//! Inventory ledger: listing creation and the all-or-nothing batch debit.

use soroban_sdk::{log, Address, Env, Map, String, Symbol, Vec};

use crate::storage;
use crate::types::{
    Error, InventoryItem, ItemStatus, RecordLine, ITEM_RESTOCKED, ITEM_SOLD, LISTING_CREATED,
};

/// Create a listing owned by `seller` and return its id.
pub fn create_listing(
    env: &Env,
    seller: &Address,
    title: &String,
    price: i128,
    currency: &Symbol,
    material: &Symbol,
    quantity: u32,
) -> Result<u64, Error> {
    if price <= 0 {
        return Err(Error::InvalidAmount);
    }
    if quantity == 0 {
        return Err(Error::InvalidQuantity);
    }

    let id = storage::next_item_id(env);
    let item = InventoryItem {
        id,
        seller: seller.clone(),
        title: title.clone(),
        price,
        currency: currency.clone(),
        material: material.clone(),
        quantity,
        status: ItemStatus::Active,
    };
    storage::set_item(env, &item);

    env.events().publish((LISTING_CREATED, seller.clone()), id);

    Ok(id)
}

/// Add stock to an active listing owned by `seller`.
///
/// A listing already marked `Sold` stays sold; sellers relist instead.
pub fn restock(env: &Env, seller: &Address, item_id: u64, quantity: u32) -> Result<u32, Error> {
    if quantity == 0 {
        return Err(Error::InvalidQuantity);
    }
    let mut item = storage::get_item(env, item_id)?;
    if item.seller != *seller {
        return Err(Error::Unauthorized);
    }
    if item.status != ItemStatus::Active {
        return Err(Error::InvalidState);
    }
    item.quantity += quantity;
    storage::set_item(env, &item);

    env.events().publish((ITEM_RESTOCKED, seller.clone()), (item_id, quantity));

    Ok(item.quantity)
}

/// Debit every line of a settled cart, or none of them.
///
/// Pass one verifies the whole batch against available stock — requested
/// quantities for the same item are aggregated so a cart cannot sneak past
/// the check by splitting an item across two lines. Pass two subtracts and
/// marks a listing `Sold` exactly once when its quantity reaches zero.
///
/// Quantities never go negative: within one invocation the two passes are
/// atomic, and across invocations the ledger serializes record operations.
pub fn reserve_and_debit(env: &Env, lines: &Vec<RecordLine>) -> Result<(), Error> {
    // Aggregate requested quantity per item id.
    let mut requested: Map<u64, u32> = Map::new(env);
    for line in lines.iter() {
        let so_far = requested.get(line.item_id).unwrap_or(0);
        requested.set(line.item_id, so_far + line.quantity);
    }

    // Pass 1: every item must be able to satisfy its aggregated request.
    for (item_id, quantity) in requested.iter() {
        let item = storage::get_item(env, item_id)?;
        if item.status != ItemStatus::Active || item.quantity < quantity {
            log!(
                env,
                "debit rejected: item {} has {} of {} requested",
                item_id,
                item.quantity,
                quantity
            );
            return Err(Error::InsufficientQuantity);
        }
    }

    // Pass 2: apply the whole batch.
    for (item_id, quantity) in requested.iter() {
        let mut item = storage::get_item(env, item_id)?;
        item.quantity -= quantity;
        if item.quantity == 0 {
            item.status = ItemStatus::Sold;
            env.events().publish((ITEM_SOLD, item.seller.clone()), item_id);
        }
        storage::set_item(env, &item);
    }

    Ok(())
}
