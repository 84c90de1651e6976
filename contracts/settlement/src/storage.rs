//! Storage keys and typed accessors.
//!
//! Instance storage holds configuration and counters; persistent storage
//! holds records, listings, impact totals, history indexes and the used
//! transaction-hash set. Hot persistent entries get their TTL extended on
//! read so long-lived audit data stays alive.

use soroban_sdk::{contracttype, Address, BytesN, Env, Symbol, Vec};

use crate::types::{Error, InventoryItem, PaymentRecord};

// TTL thresholds at ~5-second ledger close times:
//   MIN_TTL  = 17 280 ledgers ≈ 1 day (extend when remaining TTL falls below)
//   BUMP_TTL = 518 400 ledgers ≈ 30 days (target TTL after extension)
const MIN_TTL: u32 = 17_280;
const BUMP_TTL: u32 = 518_400;

/// All keys used in this contract's instance and persistent storage.
#[contracttype]
#[derive(Clone)]
pub enum DataKey {
    // -- instance --
    Admin,
    Gateway,
    ChainOracle,
    EscrowContract,
    VerifyBypass,
    Paused,
    RefundWindow,
    PendingTtl,
    NextItemId,
    NextRecordId,
    /// Gateway minimum charge per currency, in minor units.
    MinAmount(Symbol),
    /// Grams saved per unit for a material type.
    SavingsRate(Symbol),
    /// Fallback rate for materials without an entry.
    DefaultSavingsRate,
    // -- persistent --
    Item(u64),
    Record(u64),
    /// Record id that consumed a transaction hash.
    UsedTx(BytesN<32>),
    /// Cumulative grams saved per buyer.
    Impact(Address),
    /// Record ids where the address is the buyer.
    BuyerIndex(Address),
    /// Record ids containing a line sold by the address.
    SellerIndex(Address),
}

fn bump_instance(env: &Env) {
    env.storage().instance().extend_ttl(MIN_TTL, BUMP_TTL);
}

// Lifecycle / roles

pub fn is_initialized(env: &Env) -> bool {
    env.storage().instance().has(&DataKey::Admin)
}

pub fn get_admin(env: &Env) -> Result<Address, Error> {
    env.storage()
        .instance()
        .get(&DataKey::Admin)
        .ok_or(Error::NotInitialized)
}

pub fn set_admin(env: &Env, admin: &Address) {
    env.storage().instance().set(&DataKey::Admin, admin);
    bump_instance(env);
}

pub fn get_gateway(env: &Env) -> Result<Address, Error> {
    env.storage()
        .instance()
        .get(&DataKey::Gateway)
        .ok_or(Error::NotInitialized)
}

pub fn set_gateway(env: &Env, gateway: &Address) {
    env.storage().instance().set(&DataKey::Gateway, gateway);
}

pub fn get_chain_oracle(env: &Env) -> Result<Address, Error> {
    env.storage()
        .instance()
        .get(&DataKey::ChainOracle)
        .ok_or(Error::NotInitialized)
}

pub fn set_chain_oracle(env: &Env, oracle: &Address) {
    env.storage().instance().set(&DataKey::ChainOracle, oracle);
}

pub fn get_escrow_contract(env: &Env) -> Result<Address, Error> {
    env.storage()
        .instance()
        .get(&DataKey::EscrowContract)
        .ok_or(Error::NotInitialized)
}

pub fn set_escrow_contract(env: &Env, contract: &Address) {
    env.storage().instance().set(&DataKey::EscrowContract, contract);
}

// Policy knobs

pub fn verify_bypass(env: &Env) -> bool {
    env.storage()
        .instance()
        .get(&DataKey::VerifyBypass)
        .unwrap_or(false)
}

pub fn set_verify_bypass(env: &Env, on: bool) {
    env.storage().instance().set(&DataKey::VerifyBypass, &on);
}

pub fn is_paused(env: &Env) -> bool {
    env.storage().instance().get(&DataKey::Paused).unwrap_or(false)
}

pub fn set_paused(env: &Env, paused: bool) {
    env.storage().instance().set(&DataKey::Paused, &paused);
}

pub fn get_refund_window(env: &Env) -> u64 {
    env.storage()
        .instance()
        .get(&DataKey::RefundWindow)
        .unwrap_or(0)
}

pub fn set_refund_window(env: &Env, seconds: u64) {
    env.storage().instance().set(&DataKey::RefundWindow, &seconds);
}

pub fn get_pending_ttl(env: &Env) -> u64 {
    env.storage()
        .instance()
        .get(&DataKey::PendingTtl)
        .unwrap_or(0)
}

pub fn set_pending_ttl(env: &Env, seconds: u64) {
    env.storage().instance().set(&DataKey::PendingTtl, &seconds);
}

// Lookup tables

/// Minimum chargeable amount for a currency. Currencies without an entry
/// have no floor.
pub fn get_min_amount(env: &Env, currency: &Symbol) -> i128 {
    env.storage()
        .instance()
        .get(&DataKey::MinAmount(currency.clone()))
        .unwrap_or(0)
}

pub fn set_min_amount(env: &Env, currency: &Symbol, floor: i128) {
    env.storage()
        .instance()
        .set(&DataKey::MinAmount(currency.clone()), &floor);
}

/// Savings rate for a material, falling back to the default "other" rate.
pub fn get_savings_rate(env: &Env, material: &Symbol) -> i128 {
    env.storage()
        .instance()
        .get(&DataKey::SavingsRate(material.clone()))
        .unwrap_or_else(|| get_default_savings_rate(env))
}

pub fn set_savings_rate(env: &Env, material: &Symbol, rate: i128) {
    env.storage()
        .instance()
        .set(&DataKey::SavingsRate(material.clone()), &rate);
}

pub fn get_default_savings_rate(env: &Env) -> i128 {
    env.storage()
        .instance()
        .get(&DataKey::DefaultSavingsRate)
        .unwrap_or(0)
}

pub fn set_default_savings_rate(env: &Env, rate: i128) {
    env.storage().instance().set(&DataKey::DefaultSavingsRate, &rate);
}

// Counters

pub fn next_item_id(env: &Env) -> u64 {
    let id: u64 = env.storage().instance().get(&DataKey::NextItemId).unwrap_or(0);
    env.storage().instance().set(&DataKey::NextItemId, &(id + 1));
    bump_instance(env);
    id
}

pub fn next_record_id(env: &Env) -> u64 {
    let id: u64 = env
        .storage()
        .instance()
        .get(&DataKey::NextRecordId)
        .unwrap_or(0);
    env.storage().instance().set(&DataKey::NextRecordId, &(id + 1));
    bump_instance(env);
    id
}

pub fn record_count(env: &Env) -> u64 {
    env.storage()
        .instance()
        .get(&DataKey::NextRecordId)
        .unwrap_or(0)
}

// Inventory listings (persistent)

pub fn get_item(env: &Env, item_id: u64) -> Result<InventoryItem, Error> {
    let key = DataKey::Item(item_id);
    match env.storage().persistent().get::<_, InventoryItem>(&key) {
        Some(item) => {
            env.storage().persistent().extend_ttl(&key, MIN_TTL, BUMP_TTL);
            Ok(item)
        }
        None => Err(Error::ItemNotFound),
    }
}

pub fn set_item(env: &Env, item: &InventoryItem) {
    let key = DataKey::Item(item.id);
    env.storage().persistent().set(&key, item);
    env.storage().persistent().extend_ttl(&key, MIN_TTL, BUMP_TTL);
}

// Payment records (persistent, never deleted)

pub fn get_record(env: &Env, record_id: u64) -> Result<PaymentRecord, Error> {
    let key = DataKey::Record(record_id);
    match env.storage().persistent().get::<_, PaymentRecord>(&key) {
        Some(record) => {
            env.storage().persistent().extend_ttl(&key, MIN_TTL, BUMP_TTL);
            Ok(record)
        }
        None => Err(Error::RecordNotFound),
    }
}

pub fn set_record(env: &Env, record: &PaymentRecord) {
    let key = DataKey::Record(record.id);
    env.storage().persistent().set(&key, record);
    env.storage().persistent().extend_ttl(&key, MIN_TTL, BUMP_TTL);
}

// Replay protection (persistent)

pub fn tx_hash_owner(env: &Env, tx_hash: &BytesN<32>) -> Option<u64> {
    env.storage()
        .persistent()
        .get(&DataKey::UsedTx(tx_hash.clone()))
}

pub fn claim_tx_hash(env: &Env, tx_hash: &BytesN<32>, record_id: u64) {
    let key = DataKey::UsedTx(tx_hash.clone());
    env.storage().persistent().set(&key, &record_id);
    env.storage().persistent().extend_ttl(&key, MIN_TTL, BUMP_TTL);
}

// Impact ledger (persistent)

pub fn get_impact(env: &Env, buyer: &Address) -> i128 {
    env.storage()
        .persistent()
        .get(&DataKey::Impact(buyer.clone()))
        .unwrap_or(0)
}

pub fn add_impact(env: &Env, buyer: &Address, delta: i128) -> i128 {
    let key = DataKey::Impact(buyer.clone());
    let total = get_impact(env, buyer) + delta;
    env.storage().persistent().set(&key, &total);
    env.storage().persistent().extend_ttl(&key, MIN_TTL, BUMP_TTL);
    total
}

// History indexes (persistent)

fn push_index(env: &Env, key: DataKey, record_id: u64) {
    let mut ids: Vec<u64> = env
        .storage()
        .persistent()
        .get(&key)
        .unwrap_or_else(|| Vec::new(env));
    ids.push_back(record_id);
    env.storage().persistent().set(&key, &ids);
    env.storage().persistent().extend_ttl(&key, MIN_TTL, BUMP_TTL);
}

pub fn index_buyer(env: &Env, buyer: &Address, record_id: u64) {
    push_index(env, DataKey::BuyerIndex(buyer.clone()), record_id);
}

/// Index a record for a seller, once, even when several lines share the
/// seller.
pub fn index_seller(env: &Env, seller: &Address, record_id: u64) {
    let key = DataKey::SellerIndex(seller.clone());
    let ids: Vec<u64> = env
        .storage()
        .persistent()
        .get(&key)
        .unwrap_or_else(|| Vec::new(env));
    if let Some(last) = ids.last() {
        if last == record_id {
            return;
        }
    }
    push_index(env, key, record_id);
}

pub fn buyer_index(env: &Env, buyer: &Address) -> Vec<u64> {
    env.storage()
        .persistent()
        .get(&DataKey::BuyerIndex(buyer.clone()))
        .unwrap_or_else(|| Vec::new(env))
}

pub fn seller_index(env: &Env, seller: &Address) -> Vec<u64> {
    env.storage()
        .persistent()
        .get(&DataKey::SellerIndex(seller.clone()))
        .unwrap_or_else(|| Vec::new(env))
}
