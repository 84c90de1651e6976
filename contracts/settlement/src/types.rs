/*!
 * Type definitions for the settlement contract.
 *
 * This module defines the data structures, enums, errors and event constants
 * used throughout the settlement and escrow reconciliation contract. Amounts
 * are always expressed in the minor unit of their currency (cents, stroops),
 * impact savings in grams.
 */

use soroban_sdk::{contracterror, contracttype, symbol_short, Address, BytesN, String, Symbol, Vec};

// ================================================================================================
// CART AND INVENTORY
// ================================================================================================

/// One requested line of a checkout cart, as submitted by the buyer.
///
/// Carries only the item reference and quantity; price, seller and title are
/// resolved from the inventory ledger at `initiate` so a buyer cannot quote
/// their own prices.
#[contracttype]
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct CartLine {
    pub item_id: u64,
    pub quantity: u32,
}

/// One settled line of a payment record: the cart line enriched with the
/// authoritative listing data captured at initiation time.
///
/// The snapshot is deliberate — later listing edits must not change what an
/// existing record says was bought, from whom, and at what unit price.
#[contracttype]
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct RecordLine {
    pub item_id: u64,
    pub seller: Address,
    pub quantity: u32,
    pub unit_price: i128,
    pub title: String,
}

/// Lifecycle status of an inventory listing.
///
/// `Sold` is entered exactly once, when a settlement drives the available
/// quantity to zero. Listings never return to `Active` from `Sold`.
#[contracttype]
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum ItemStatus {
    Active,
    Sold,
}

/// An inventory listing owned by the contract's inventory ledger.
///
/// `quantity` is the number of units still available for sale and never goes
/// negative: the batch debit in `inventory` rejects any cart it cannot fully
/// satisfy before touching a single listing.
#[contracttype]
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct InventoryItem {
    pub id: u64,
    pub seller: Address,
    pub title: String,
    /// Unit price in minor currency units.
    pub price: i128,
    pub currency: Symbol,
    /// Material classification used by the impact accumulator, e.g. "plastic".
    pub material: Symbol,
    pub quantity: u32,
    pub status: ItemStatus,
}

// ================================================================================================
// PAYMENT RECORDS
// ================================================================================================

/// The payment rail chosen at checkout initiation.
///
/// A record's rail is fixed for its whole lifecycle; confirmation entry points
/// reject reports arriving on the wrong rail (`Error::RailMismatch`).
#[contracttype]
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Rail {
    /// Off-chain card/bank payment through the fiat gateway.
    Fiat,
    /// On-chain payment locked in the external escrow contract until delivery.
    CryptoEscrow,
    /// On-chain transfer straight to the seller's wallet.
    CryptoDirect,
}

/// State of a payment record.
///
/// # Transition rules
/// - `Pending` → `Completed` | `Failed` | `EscrowHeld` | `SettlementDue`
/// - `EscrowHeld` → `EscrowReleased` | `Refunded` | `SettlementDue`
/// - `SettlementDue` → `Completed` | `EscrowReleased` (via `retry_settlement`)
///
/// `Completed`, `Failed`, `EscrowReleased` and `Refunded` are terminal; no
/// transition leaves them. States only advance — a record never regresses.
#[contracttype]
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum PaymentState {
    /// Created at initiation, no verified payment yet.
    Pending,
    /// Verified, inventory debited, impact credited. Terminal success.
    Completed,
    /// Definitive negative outcome (gateway decline, expiry). Terminal.
    Failed,
    /// On-chain funds verified as locked in escrow; debit deferred to release.
    EscrowHeld,
    /// Delivery confirmed, escrow released, side effects applied. Terminal success.
    EscrowReleased,
    /// Escrow returned to the buyer inside the refund window. Terminal.
    Refunded,
    /// Verification succeeded but the inventory debit could not be applied
    /// (stock consumed by a competing record). Held for reconciliation —
    /// distinguishable from success, never silently dropped.
    SettlementDue,
}

/// Local mirror of the external escrow contract's hold for one record.
///
/// The contract does not own the on-chain escrow state; this mirror is kept
/// consistent with it through oracle-attested events. The escrow identifier
/// is canonically the payment record id.
#[contracttype]
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct EscrowMirror {
    pub escrow_id: u64,
    pub buyer: Address,
    pub amount: i128,
    pub delivered: bool,
    pub completed: bool,
    pub created_at: u64,
}

/// Itemized environmental-savings attribution for one line of a record.
#[contracttype]
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ImpactLine {
    pub item_id: u64,
    pub material: Symbol,
    pub quantity: u32,
    /// Grams of material saved, `rate(material) * quantity`.
    pub saved: i128,
}

/// The impact breakdown attributed to a settled record.
///
/// Computed exactly once, at settlement, and never recomputed — rate table
/// changes after the fact must not rewrite history.
#[contracttype]
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ImpactSnapshot {
    pub total: i128,
    pub lines: Vec<ImpactLine>,
}

/// Escrow mirror slot on a payment record.
///
/// A dedicated two-variant enum rather than `Option<EscrowMirror>`: the sdk's
/// val conversions cover options of built-in types only, not of user-defined
/// contract types.
#[contracttype]
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum EscrowAttachment {
    None,
    Mirror(EscrowMirror),
}

/// Impact snapshot slot on a payment record. Same shape as
/// [`EscrowAttachment`], for the same conversion reason.
#[contracttype]
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum ImpactAttachment {
    None,
    Snapshot(ImpactSnapshot),
}

/// The unit of settlement: one attempted purchase, single- or multi-item.
///
/// Records are created at initiation, mutated only by the orchestrator entry
/// points, and never deleted — the full set is the audit trail.
#[contracttype]
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct PaymentRecord {
    pub id: u64,
    pub buyer: Address,
    pub multi_item: bool,
    pub lines: Vec<RecordLine>,
    /// Cart total in minor currency units.
    pub amount: i128,
    pub currency: Symbol,
    pub rail: Rail,
    pub state: PaymentState,
    /// Gateway intent id, registered by the gateway after intent creation.
    pub fiat_intent: Option<String>,
    /// On-chain payment transaction hash, once verified.
    pub tx_hash: Option<BytesN<32>>,
    pub escrow: EscrowAttachment,
    /// Populated if and only if the record reached a terminal success state.
    pub impact: ImpactAttachment,
    /// True when verification was bypassed under the audited test-mode flag.
    /// A bypassed record is never indistinguishable from a verified one.
    pub unverified: bool,
    pub fail_reason: Option<Symbol>,
    pub created_at: u64,
    pub completed_at: Option<u64>,
}

impl PaymentRecord {
    /// The escrow mirror, if one was attached at verification.
    pub fn mirror(&self) -> Option<EscrowMirror> {
        match &self.escrow {
            EscrowAttachment::Mirror(mirror) => Some(mirror.clone()),
            EscrowAttachment::None => None,
        }
    }

    /// The impact snapshot, if the record settled.
    pub fn snapshot(&self) -> Option<ImpactSnapshot> {
        match &self.impact {
            ImpactAttachment::Snapshot(snapshot) => Some(snapshot.clone()),
            ImpactAttachment::None => None,
        }
    }
}

/// Perspective selector for the history query.
#[contracttype]
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Role {
    Buyer,
    Seller,
}

// ================================================================================================
// RAIL ATTESTATIONS
// ================================================================================================

/// Authoritative intent status as re-fetched from the fiat processor.
///
/// Only `Succeeded` settles. `Processing` is ambiguous — the caller retries
/// later. `Failed` is definitive and is never retried automatically.
#[contracttype]
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum GatewayStatus {
    Succeeded,
    Processing,
    Failed,
}

/// A gateway-signed report of an intent's current status.
///
/// The contract never accepts a buyer-supplied "it succeeded" flag: this
/// report must be authorized by the configured gateway address, and its
/// intent id must equal the one stored on the record — a caller cannot
/// substitute an unrelated but genuinely succeeded intent.
#[contracttype]
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct GatewayReport {
    pub intent_id: String,
    pub status: GatewayStatus,
}

/// An oracle-signed summary of an on-chain transaction receipt.
///
/// `decoded_seller` and `decoded_escrow_id` come from decoding the escrow
/// call's input against the known function signature; they are `None` for a
/// plain transfer. The matching checks against the payment record happen
/// inside the contract — the oracle only relays what the chain says.
#[contracttype]
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ChainReceipt {
    pub tx_hash: BytesN<32>,
    /// Receipt status: true only for a successful transaction.
    pub succeeded: bool,
    /// Receipt destination address.
    pub to: Address,
    pub decoded_seller: Option<Address>,
    pub decoded_escrow_id: Option<u64>,
    /// Transferred amount in minor currency units.
    pub amount: i128,
}

/// An oracle-signed proof that an escrow release or refund event was actually
/// emitted on-chain for the given escrow id.
#[contracttype]
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct EscrowEvent {
    pub escrow_id: u64,
    pub tx_hash: BytesN<32>,
}

// ================================================================================================
// CONFIGURATION
// ================================================================================================

/// Collaborator addresses and policy knobs injected at `initialize`.
#[contracttype]
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct InitConfig {
    /// Fiat gateway attestor: authorized to register intents and report status.
    pub gateway: Address,
    /// Chain RPC oracle: authorized to submit receipts and escrow events.
    pub chain_oracle: Address,
    /// Address of the external escrow contract payments must be sent to.
    pub escrow_contract: Address,
    /// Seconds after escrow creation during which a refund is allowed.
    pub refund_window: u64,
    /// Seconds after which an unconfirmed pending record may be expired.
    pub pending_ttl: u64,
    /// Audited test-mode flag: skip rail verification, marking records
    /// `unverified`. Never enabled implicitly.
    pub verify_bypass: bool,
}

// ================================================================================================
// ERRORS
// ================================================================================================

/// Error codes for every rejection path in the contract.
///
/// Grouped by area: 1-4 lifecycle/access, 5-12 checkout validation, 13-19
/// verification, 20-25 escrow and reconciliation.
#[contracterror]
#[derive(Copy, Clone, Debug, Eq, PartialEq, PartialOrd, Ord)]
#[repr(u32)]
pub enum Error {
    AlreadyInitialized = 1,
    NotInitialized = 2,
    Unauthorized = 3,
    ContractPaused = 4,

    ItemNotFound = 5,
    RecordNotFound = 6,
    EmptyCart = 7,
    InvalidQuantity = 8,
    /// Buyers cannot purchase their own listings.
    SelfPurchase = 9,
    InsufficientQuantity = 10,
    /// All lines of one cart must share a currency.
    CurrencyMismatch = 11,
    /// Cart total is below the currency's gateway minimum. Rejected before
    /// any gateway contact.
    AmountTooLow = 12,

    /// Operation not permitted from the record's current state.
    InvalidState = 13,
    /// Report or receipt arrived on a rail the record was not opened on.
    RailMismatch = 14,
    IntentAlreadyRegistered = 15,
    IntentMissing = 16,
    /// Gateway intent id does not equal the one stored on the record.
    IntentMismatch = 17,
    /// Definitive negative from receipt/decode matching.
    VerificationFailed = 18,
    /// Gateway still reports the intent as processing; retry later.
    PaymentStillProcessing = 19,

    /// Transaction hash already settled a different record.
    ReplayDetected = 20,
    RefundWindowClosed = 21,
    /// Pending record has not yet outlived its TTL.
    NotExpired = 22,
    /// Record is not in the `SettlementDue` reconciliation state.
    SettlementNotDue = 23,
    /// Direct-transfer rail cannot pay a multi-seller cart.
    UnsupportedRail = 24,
    InvalidAmount = 25,
}

// ================================================================================================
// EVENT TOPICS
// ================================================================================================
// Published on every state transition for off-chain indexing and audit.

/// (record_id) — record created in `Pending`.
pub const RECORD_INITIATED: Symbol = symbol_short!("rec_init");

/// (record_id, intent_id) — gateway intent attached to a fiat record.
pub const INTENT_REGISTERED: Symbol = symbol_short!("int_reg");

/// (record_id) — fiat verification succeeded.
pub const FIAT_CONFIRMED: Symbol = symbol_short!("fiat_ok");

/// (record_id, reason) — record reached `Failed`.
pub const RECORD_FAILED: Symbol = symbol_short!("rec_fail");

/// (record_id, tx_hash) — escrow hold verified, record in `EscrowHeld`.
pub const ESCROW_HELD: Symbol = symbol_short!("esc_held");

/// (record_id) — delivery confirmed, escrow released.
pub const ESCROW_RELEASED: Symbol = symbol_short!("esc_rel");

/// (record_id) — escrow refunded inside the refund window.
pub const ESCROW_REFUNDED: Symbol = symbol_short!("esc_rfnd");

/// (record_id) — debit and credit applied, terminal success reached.
pub const RECORD_SETTLED: Symbol = symbol_short!("settled");

/// (record_id) — verified but unsettled, held for reconciliation.
pub const SETTLEMENT_DUE: Symbol = symbol_short!("setl_due");

/// (record_id) — verification bypassed under the audited test-mode flag.
pub const UNVERIFIED_BYPASS: Symbol = symbol_short!("unverif");

/// (item_id, seller) — listing created.
pub const LISTING_CREATED: Symbol = symbol_short!("item_new");

/// (item_id) — listing quantity reached zero and was marked sold.
pub const ITEM_SOLD: Symbol = symbol_short!("itm_sold");

/// (item_id, quantity) — stock added to an active listing.
pub const ITEM_RESTOCKED: Symbol = symbol_short!("restocked");

/// (buyer, delta) — cumulative impact total credited.
pub const IMPACT_CREDITED: Symbol = symbol_short!("impact");
