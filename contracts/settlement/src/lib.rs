/*!
 * Settlement & Escrow Reconciliation Contract
 *
 * This contract is the book of record for marketplace purchases that may be
 * paid over two structurally different rails — an off-chain fiat gateway and
 * an on-chain escrow contract — and converges both onto one consistent
 * order/inventory/impact state.
 *
 * Key properties:
 * - Exactly-once inventory decrement and impact credit per settled record,
 *   under retried and duplicated confirmation calls
 * - No trust in client-supplied success claims: fiat status is re-reported by
 *   the authorized gateway, chain receipts by the authorized oracle, and the
 *   matching checks (intent id, destination, decoded seller and escrow id,
 *   replayed transaction hashes) run inside the contract
 * - Multi-item carts settle as one unit: every line is debited and credited,
 *   or none is
 * - Partial failures are never hidden: a verified payment whose debit cannot
 *   be applied is parked in a distinct `SettlementDue` state for
 *   reconciliation instead of being reported as success
 *
 * Business flow:
 * 1. Sellers list inventory; buyers initiate a checkout on a chosen rail
 * 2. The record waits in `Pending` while the rail settles externally
 * 3. A gateway report or chain receipt re-enters the contract, is verified,
 *    and drives the record's state machine forward
 * 4. Only the transition into terminal success debits inventory and credits
 *    the buyer's environmental-impact ledger
 */

#![no_std]

mod impact;
mod inventory;
mod storage;
mod types;


use soroban_sdk::{
    contract, contractimpl, log, symbol_short, Address, Env, Map, String, Symbol, Vec,
};

use types::{
    CartLine, ChainReceipt, Error, EscrowAttachment, EscrowEvent, EscrowMirror, GatewayReport,
    GatewayStatus, ImpactAttachment, InitConfig, InventoryItem, PaymentRecord, PaymentState, Rail,
    RecordLine, Role,
    ESCROW_HELD, ESCROW_REFUNDED, ESCROW_RELEASED, FIAT_CONFIRMED, INTENT_REGISTERED,
    RECORD_FAILED, RECORD_INITIATED, RECORD_SETTLED, SETTLEMENT_DUE, UNVERIFIED_BYPASS,
};

#[contract]
pub struct SettlementContract;

#[contractimpl]
impl SettlementContract {
    /// Initializes the settlement contract with its collaborator roles and
    /// policy tables.
    ///
    /// The minimum-amount and savings-rate tables are injected here rather
    /// than read from ambient state, so every deployment carries an explicit,
    /// auditable version of both.
    ///
    /// # Arguments
    /// * `admin` - address with administrative privileges (pause, config)
    /// * `config` - gateway/oracle/escrow addresses and policy knobs
    /// * `min_amounts` - per-currency gateway charge floor, minor units
    /// * `savings_rates` - grams saved per unit, keyed by material
    /// * `default_savings_rate` - fallback rate for unknown materials
    ///
    /// # Errors
    /// - `AlreadyInitialized` if called a second time
    pub fn initialize(
        env: Env,
        admin: Address,
        config: InitConfig,
        min_amounts: Map<Symbol, i128>,
        savings_rates: Map<Symbol, i128>,
        default_savings_rate: i128,
    ) -> Result<(), Error> {
        if storage::is_initialized(&env) {
            return Err(Error::AlreadyInitialized);
        }

        storage::set_admin(&env, &admin);
        storage::set_gateway(&env, &config.gateway);
        storage::set_chain_oracle(&env, &config.chain_oracle);
        storage::set_escrow_contract(&env, &config.escrow_contract);
        storage::set_refund_window(&env, config.refund_window);
        storage::set_pending_ttl(&env, config.pending_ttl);
        storage::set_verify_bypass(&env, config.verify_bypass);
        storage::set_paused(&env, false);

        for (currency, floor) in min_amounts.iter() {
            storage::set_min_amount(&env, &currency, floor);
        }
        for (material, rate) in savings_rates.iter() {
            storage::set_savings_rate(&env, &material, rate);
        }
        storage::set_default_savings_rate(&env, default_savings_rate);

        Ok(())
    }

    // ============================================================================================
    // INVENTORY
    // ============================================================================================

    /// Creates an inventory listing owned by `seller`.
    ///
    /// # Errors
    /// - `ContractPaused` if trading is disabled
    /// - `InvalidAmount` / `InvalidQuantity` on non-positive price or quantity
    pub fn create_listing(
        env: Env,
        seller: Address,
        title: String,
        price: i128,
        currency: Symbol,
        material: Symbol,
        quantity: u32,
    ) -> Result<u64, Error> {
        Self::_require_not_paused(&env)?;
        seller.require_auth();
        inventory::create_listing(&env, &seller, &title, price, &currency, &material, quantity)
    }

    /// Adds stock to one of `seller`'s active listings. Returns the new
    /// quantity. Used by sellers after a parked record drained their stock so
    /// `retry_settlement` can complete the reconciliation.
    ///
    /// # Errors
    /// - `Unauthorized` if the listing belongs to a different seller
    /// - `InvalidState` if the listing was already marked sold
    pub fn restock(env: Env, seller: Address, item_id: u64, quantity: u32) -> Result<u32, Error> {
        Self::_require_not_paused(&env)?;
        seller.require_auth();
        inventory::restock(&env, &seller, item_id, quantity)
    }

    // ============================================================================================
    // CHECKOUT INITIATION
    // ============================================================================================

    /// Opens a checkout: validates the cart, computes the total and persists
    /// a `Pending` payment record on the chosen rail.
    ///
    /// Validation is synchronous and creates no state on rejection:
    /// - every line must reference an active listing with enough stock
    ///   (a read-only check — the authoritative debit happens at settlement)
    /// - a buyer cannot purchase their own listing
    /// - all lines must share one currency
    /// - on the fiat rail the total must clear the currency's gateway floor,
    ///   checked here so a too-small charge never reaches the gateway
    /// - the direct-transfer rail requires a single-seller cart, since a
    ///   direct transfer pays exactly one wallet
    ///
    /// # Returns
    /// The new record id, which is also the canonical escrow identifier for
    /// escrow-rail purchases.
    pub fn initiate(
        env: Env,
        buyer: Address,
        cart: Vec<CartLine>,
        rail: Rail,
    ) -> Result<u64, Error> {
        Self::_require_not_paused(&env)?;
        buyer.require_auth();

        if cart.is_empty() {
            return Err(Error::EmptyCart);
        }

        let mut lines: Vec<RecordLine> = Vec::new(&env);
        let mut amount: i128 = 0;
        let mut currency: Option<Symbol> = None;
        // Aggregated requested quantity per item, so a cart cannot pass the
        // availability check by splitting one item across several lines.
        let mut requested: Map<u64, u32> = Map::new(&env);

        for cart_line in cart.iter() {
            if cart_line.quantity == 0 {
                return Err(Error::InvalidQuantity);
            }
            let item = storage::get_item(&env, cart_line.item_id)?;
            if item.seller == buyer {
                return Err(Error::SelfPurchase);
            }
            let total_requested = requested
                .get(cart_line.item_id)
                .unwrap_or(0)
                .checked_add(cart_line.quantity)
                .ok_or(Error::InsufficientQuantity)?;
            if item.status != types::ItemStatus::Active || total_requested > item.quantity {
                return Err(Error::InsufficientQuantity);
            }
            requested.set(cart_line.item_id, total_requested);
            match &currency {
                None => currency = Some(item.currency.clone()),
                Some(c) if *c != item.currency => return Err(Error::CurrencyMismatch),
                Some(_) => {}
            }
            let line_total = item
                .price
                .checked_mul(cart_line.quantity as i128)
                .ok_or(Error::InvalidAmount)?;
            amount = amount.checked_add(line_total).ok_or(Error::InvalidAmount)?;
            lines.push_back(RecordLine {
                item_id: cart_line.item_id,
                seller: item.seller.clone(),
                quantity: cart_line.quantity,
                unit_price: item.price,
                title: item.title.clone(),
            });
        }
        let currency = currency.ok_or(Error::EmptyCart)?;

        if rail == Rail::Fiat {
            let floor = storage::get_min_amount(&env, &currency);
            if amount < floor {
                log!(&env, "amount {} below gateway floor {}", amount, floor);
                return Err(Error::AmountTooLow);
            }
        }
        if rail == Rail::CryptoDirect && Self::_sole_seller(&lines).is_none() {
            return Err(Error::UnsupportedRail);
        }

        let record_id = storage::next_record_id(&env);
        let record = PaymentRecord {
            id: record_id,
            buyer: buyer.clone(),
            multi_item: lines.len() > 1,
            lines: lines.clone(),
            amount,
            currency,
            rail: rail.clone(),
            state: PaymentState::Pending,
            fiat_intent: None,
            tx_hash: None,
            escrow: EscrowAttachment::None,
            impact: ImpactAttachment::None,
            unverified: false,
            fail_reason: None,
            created_at: env.ledger().timestamp(),
            completed_at: None,
        };
        storage::set_record(&env, &record);

        storage::index_buyer(&env, &buyer, record_id);
        for line in lines.iter() {
            storage::index_seller(&env, &line.seller, record_id);
        }

        env.events().publish((RECORD_INITIATED, buyer), record_id);

        Ok(record_id)
    }

    // ============================================================================================
    // FIAT RAIL
    // ============================================================================================

    /// Attaches the gateway's intent id to a pending fiat record.
    ///
    /// Called by the gateway after it created the charge intent with the
    /// processor. The id can be registered exactly once; `confirm_fiat`
    /// later requires the reported id to equal it.
    ///
    /// # Errors
    /// - `RailMismatch` if the record is not on the fiat rail
    /// - `InvalidState` if the record left `Pending`
    /// - `IntentAlreadyRegistered` on a second registration
    pub fn register_intent(env: Env, record_id: u64, intent_id: String) -> Result<(), Error> {
        Self::_require_not_paused(&env)?;
        storage::get_gateway(&env)?.require_auth();

        let mut record = storage::get_record(&env, record_id)?;
        if record.rail != Rail::Fiat {
            return Err(Error::RailMismatch);
        }
        if record.state != PaymentState::Pending {
            return Err(Error::InvalidState);
        }
        if record.fiat_intent.is_some() {
            return Err(Error::IntentAlreadyRegistered);
        }

        record.fiat_intent = Some(intent_id.clone());
        storage::set_record(&env, &record);

        env.events().publish((INTENT_REGISTERED, record.buyer), (record_id, intent_id));

        Ok(())
    }

    /// Confirms a fiat payment from a gateway status report and, on success,
    /// settles the record.
    ///
    /// The report must be authorized by the configured gateway address — the
    /// status is what the gateway re-fetched from the processor, never a
    /// client claim — and its intent id must equal the one registered on the
    /// record, so an unrelated but genuinely succeeded intent cannot be
    /// substituted.
    ///
    /// Outcome mapping:
    /// - `Succeeded` → debit inventory, credit impact, `Completed` (or
    ///   `SettlementDue` when stock was consumed by a competing record)
    /// - `Processing` → `PaymentStillProcessing` error, state untouched;
    ///   the caller retries later
    /// - `Failed` → record moves to `Failed`; definitive, never auto-retried
    ///
    /// A record already in a terminal state returns that state as a no-op —
    /// duplicate webhook deliveries must not re-apply side effects.
    pub fn confirm_fiat(
        env: Env,
        record_id: u64,
        report: GatewayReport,
    ) -> Result<PaymentState, Error> {
        Self::_require_not_paused(&env)?;

        let mut record = storage::get_record(&env, record_id)?;
        if record.rail != Rail::Fiat {
            return Err(Error::RailMismatch);
        }
        if Self::_is_terminal(&record.state) {
            return Ok(record.state);
        }
        if record.state != PaymentState::Pending {
            // Verified already; reconciliation goes through retry_settlement.
            return Err(Error::InvalidState);
        }

        storage::get_gateway(&env)?.require_auth();

        let stored_intent = record.fiat_intent.clone().ok_or(Error::IntentMissing)?;
        if report.intent_id != stored_intent {
            log!(&env, "intent mismatch for record {}", record_id);
            return Err(Error::IntentMismatch);
        }

        match report.status {
            GatewayStatus::Processing => Err(Error::PaymentStillProcessing),
            GatewayStatus::Failed => {
                Self::_fail(&env, &mut record, symbol_short!("declined"));
                Ok(PaymentState::Failed)
            }
            GatewayStatus::Succeeded => {
                env.events().publish((FIAT_CONFIRMED, record.buyer.clone()), record_id);
                Ok(Self::_settle_or_park(&env, &mut record))
            }
        }
    }

    // ============================================================================================
    // CRYPTO RAIL
    // ============================================================================================

    /// Verifies an on-chain payment for a pending crypto record.
    ///
    /// The receipt must be authorized by the chain oracle (unless the audited
    /// verification bypass is enabled, which marks the record `unverified`).
    /// In-contract matching requires: a successful receipt status; the
    /// destination equal to the escrow contract (escrow) or the seller's
    /// wallet (direct transfer); the decoded escrow id equal to the record
    /// id; the decoded seller equal to the cart's seller; and an amount
    /// covering the record total. A transaction hash that already settled a
    /// different record is rejected outright.
    ///
    /// Escrow-rail success parks funds in `EscrowHeld` and defers the debit
    /// and impact credit to delivery confirmation; direct-transfer success
    /// settles immediately.
    ///
    /// # Errors
    /// - `RailMismatch` if the flag or record rail disagree
    /// - `ReplayDetected` if the hash belongs to another record
    /// - `VerificationFailed` on any matching failure; the record stays
    ///   `Pending` so a correct hash can still be submitted
    pub fn submit_crypto(
        env: Env,
        record_id: u64,
        receipt: ChainReceipt,
        escrow_flag: bool,
    ) -> Result<PaymentState, Error> {
        Self::_require_not_paused(&env)?;

        let mut record = storage::get_record(&env, record_id)?;
        let escrow_rail = match record.rail {
            Rail::Fiat => return Err(Error::RailMismatch),
            Rail::CryptoEscrow => true,
            Rail::CryptoDirect => false,
        };
        if escrow_flag != escrow_rail {
            return Err(Error::RailMismatch);
        }
        if Self::_is_terminal(&record.state) || record.state == PaymentState::EscrowHeld {
            // Duplicate submission observes the already-advanced state.
            return Ok(record.state);
        }
        if record.state != PaymentState::Pending {
            return Err(Error::InvalidState);
        }

        if let Some(owner) = storage::tx_hash_owner(&env, &receipt.tx_hash) {
            if owner != record_id {
                log!(&env, "tx hash replay: already settled record {}", owner);
                return Err(Error::ReplayDetected);
            }
        }

        if storage::verify_bypass(&env) {
            // Test-mode bypass: no oracle involved, so the buyer signs, and
            // the record is permanently flagged as unverified.
            record.buyer.require_auth();
            record.unverified = true;
            env.events().publish((UNVERIFIED_BYPASS, record.buyer.clone()), record_id);
        } else {
            storage::get_chain_oracle(&env)?.require_auth();
            Self::_verify_receipt(&env, &record, &receipt, escrow_rail)?;
        }

        storage::claim_tx_hash(&env, &receipt.tx_hash, record_id);
        record.tx_hash = Some(receipt.tx_hash.clone());

        if escrow_rail {
            record.escrow = EscrowAttachment::Mirror(EscrowMirror {
                escrow_id: record_id,
                buyer: record.buyer.clone(),
                amount: record.amount,
                delivered: false,
                completed: false,
                created_at: env.ledger().timestamp(),
            });
            record.state = PaymentState::EscrowHeld;
            storage::set_record(&env, &record);
            env.events().publish((ESCROW_HELD, record.buyer), (record_id, receipt.tx_hash));
            Ok(PaymentState::EscrowHeld)
        } else {
            Ok(Self::_settle_or_park(&env, &mut record))
        }
    }

    /// Releases a held escrow after the buyer's delivery confirmation was
    /// verified on-chain, then settles the record.
    ///
    /// Only valid from `EscrowHeld`. The proof must be oracle-authorized and
    /// carry the record's canonical escrow id; without a matching on-chain
    /// release event the state does not advance. The inventory debit and
    /// impact credit happen here, not at escrow creation.
    pub fn confirm_delivery(
        env: Env,
        record_id: u64,
        proof: EscrowEvent,
    ) -> Result<PaymentState, Error> {
        Self::_require_not_paused(&env)?;

        let mut record = storage::get_record(&env, record_id)?;
        if record.rail != Rail::CryptoEscrow {
            return Err(Error::RailMismatch);
        }
        if record.state == PaymentState::EscrowReleased {
            return Ok(PaymentState::EscrowReleased);
        }
        if record.state != PaymentState::EscrowHeld {
            return Err(Error::InvalidState);
        }

        Self::_verify_escrow_event(&env, &mut record, &proof)?;

        let mut mirror = record.mirror().ok_or(Error::InvalidState)?;
        mirror.delivered = true;
        record.escrow = EscrowAttachment::Mirror(mirror);

        Ok(Self::_settle_or_park(&env, &mut record))
    }

    /// Refunds a held escrow to the buyer.
    ///
    /// Allowed only while the record is `EscrowHeld`, delivery was never
    /// confirmed, and the refund window since escrow creation has not closed.
    /// The proof attests the on-chain refund event. Inventory and impact are
    /// untouched — nothing was ever debited for this record.
    pub fn refund_escrow(
        env: Env,
        record_id: u64,
        proof: EscrowEvent,
    ) -> Result<PaymentState, Error> {
        Self::_require_not_paused(&env)?;

        let mut record = storage::get_record(&env, record_id)?;
        if record.rail != Rail::CryptoEscrow {
            return Err(Error::RailMismatch);
        }
        if record.state == PaymentState::Refunded {
            return Ok(PaymentState::Refunded);
        }
        if record.state != PaymentState::EscrowHeld {
            return Err(Error::InvalidState);
        }

        let mirror = record.mirror().ok_or(Error::InvalidState)?;
        if mirror.delivered {
            return Err(Error::InvalidState);
        }
        let window = storage::get_refund_window(&env);
        if env.ledger().timestamp() > mirror.created_at + window {
            return Err(Error::RefundWindowClosed);
        }

        Self::_verify_escrow_event(&env, &mut record, &proof)?;

        record.state = PaymentState::Refunded;
        record.completed_at = Some(env.ledger().timestamp());
        storage::set_record(&env, &record);

        env.events().publish((ESCROW_REFUNDED, record.buyer), record_id);

        Ok(PaymentState::Refunded)
    }

    // ============================================================================================
    // RECONCILIATION
    // ============================================================================================

    /// Re-attempts the inventory debit and impact credit for a record parked
    /// in `SettlementDue`.
    ///
    /// Callable by anyone — the record's verification already happened, and
    /// this can only move it toward its rail's success terminal. If stock is
    /// still insufficient the call fails and the record stays parked.
    pub fn retry_settlement(env: Env, record_id: u64) -> Result<PaymentState, Error> {
        Self::_require_not_paused(&env)?;

        let mut record = storage::get_record(&env, record_id)?;
        if record.state != PaymentState::SettlementDue {
            return Err(Error::SettlementNotDue);
        }

        if !Self::_try_settle(&env, &mut record) {
            return Err(Error::InsufficientQuantity);
        }
        storage::set_record(&env, &record);
        Ok(record.state)
    }

    /// Fails a `Pending` record that outlived the configured TTL without any
    /// successful verification. Callable by anyone, like expired-trade
    /// cleanup in other marketplaces — it keeps abandoned checkouts from
    /// lingering forever.
    pub fn expire_pending(env: Env, record_id: u64) -> Result<PaymentState, Error> {
        Self::_require_not_paused(&env)?;

        let mut record = storage::get_record(&env, record_id)?;
        if record.state != PaymentState::Pending {
            return Err(Error::InvalidState);
        }
        if env.ledger().timestamp() < record.created_at + storage::get_pending_ttl(&env) {
            return Err(Error::NotExpired);
        }

        Self::_fail(&env, &mut record, symbol_short!("expired"));
        Ok(PaymentState::Failed)
    }

    // ============================================================================================
    // QUERIES
    // ============================================================================================

    pub fn get_record(env: Env, record_id: u64) -> Result<PaymentRecord, Error> {
        storage::get_record(&env, record_id)
    }

    pub fn get_item(env: Env, item_id: u64) -> Result<InventoryItem, Error> {
        storage::get_item(&env, item_id)
    }

    /// Payment history for an address, as buyer or as seller of any line.
    pub fn get_history(env: Env, who: Address, role: Role) -> Vec<PaymentRecord> {
        let ids = match role {
            Role::Buyer => storage::buyer_index(&env, &who),
            Role::Seller => storage::seller_index(&env, &who),
        };
        let mut records: Vec<PaymentRecord> = Vec::new(&env);
        for id in ids.iter() {
            if let Ok(record) = storage::get_record(&env, id) {
                records.push_back(record);
            }
        }
        records
    }

    /// Cumulative grams of material saved by a buyer's settled purchases.
    pub fn get_impact(env: Env, buyer: Address) -> i128 {
        storage::get_impact(&env, &buyer)
    }

    pub fn get_admin(env: Env) -> Result<Address, Error> {
        storage::get_admin(&env)
    }

    pub fn is_paused(env: Env) -> bool {
        storage::is_paused(&env)
    }

    pub fn record_count(env: Env) -> u64 {
        storage::record_count(&env)
    }

    // ============================================================================================
    // ADMINISTRATION
    // ============================================================================================

    /// Halts all mutating operations. Emergency mechanism; queries stay up.
    pub fn pause(env: Env) -> Result<(), Error> {
        Self::_require_admin(&env)?;
        storage::set_paused(&env, true);
        Ok(())
    }

    pub fn unpause(env: Env) -> Result<(), Error> {
        Self::_require_admin(&env)?;
        storage::set_paused(&env, false);
        Ok(())
    }

    /// Transfers administrative control. The new admin must co-sign.
    pub fn update_admin(env: Env, new_admin: Address) -> Result<(), Error> {
        Self::_require_admin(&env)?;
        new_admin.require_auth();
        storage::set_admin(&env, &new_admin);
        env.events().publish((symbol_short!("adm_upd"), env.current_contract_address()), new_admin);
        Ok(())
    }

    /// Updates the gateway charge floor for one currency.
    pub fn set_min_amount(env: Env, currency: Symbol, floor: i128) -> Result<(), Error> {
        Self::_require_admin(&env)?;
        if floor < 0 {
            return Err(Error::InvalidAmount);
        }
        storage::set_min_amount(&env, &currency, floor);
        Ok(())
    }

    /// Updates the savings rate for one material. Existing impact snapshots
    /// are never recomputed.
    pub fn set_savings_rate(env: Env, material: Symbol, rate: i128) -> Result<(), Error> {
        Self::_require_admin(&env)?;
        if rate < 0 {
            return Err(Error::InvalidAmount);
        }
        storage::set_savings_rate(&env, &material, rate);
        Ok(())
    }

    /// Toggles the verification bypass. Admin-only and event-emitting so
    /// every flip leaves an audit trail; never switched implicitly.
    pub fn set_verify_bypass(env: Env, on: bool) -> Result<(), Error> {
        Self::_require_admin(&env)?;
        storage::set_verify_bypass(&env, on);
        env.events().publish((symbol_short!("byp_set"), env.current_contract_address()), on);
        Ok(())
    }

    // ============================================================================================
    // INTERNAL HELPERS
    // ============================================================================================

    fn _require_admin(env: &Env) -> Result<(), Error> {
        storage::get_admin(env)?.require_auth();
        Ok(())
    }

    fn _require_not_paused(env: &Env) -> Result<(), Error> {
        if storage::is_paused(env) {
            return Err(Error::ContractPaused);
        }
        Ok(())
    }

    fn _is_terminal(state: &PaymentState) -> bool {
        matches!(
            state,
            PaymentState::Completed
                | PaymentState::Failed
                | PaymentState::EscrowReleased
                | PaymentState::Refunded
        )
    }

    /// The terminal success state a record settles into, by rail.
    fn _success_terminal(rail: &Rail) -> PaymentState {
        match rail {
            Rail::Fiat | Rail::CryptoDirect => PaymentState::Completed,
            Rail::CryptoEscrow => PaymentState::EscrowReleased,
        }
    }

    /// The single seller of a cart, if all lines share one.
    fn _sole_seller(lines: &Vec<RecordLine>) -> Option<Address> {
        let mut seller: Option<Address> = None;
        for line in lines.iter() {
            match &seller {
                None => seller = Some(line.seller.clone()),
                Some(s) if *s != line.seller => return None,
                Some(_) => {}
            }
        }
        seller
    }

    /// Receipt matching for the crypto rail. Any failure is definitive for
    /// this receipt but leaves the record `Pending` — the buyer may still
    /// hold a correct transaction.
    fn _verify_receipt(
        env: &Env,
        record: &PaymentRecord,
        receipt: &ChainReceipt,
        escrow_rail: bool,
    ) -> Result<(), Error> {
        if !receipt.succeeded {
            log!(env, "receipt status not successful for record {}", record.id);
            return Err(Error::VerificationFailed);
        }
        if receipt.amount < record.amount {
            log!(env, "receipt amount {} below total {}", receipt.amount, record.amount);
            return Err(Error::VerificationFailed);
        }

        if escrow_rail {
            // Funds must land in the escrow contract, and the decoded call
            // parameters must point at this record — a valid but unrelated
            // transaction hash verifies nothing.
            if receipt.to != storage::get_escrow_contract(env)? {
                return Err(Error::VerificationFailed);
            }
            if receipt.decoded_escrow_id != Some(record.id) {
                return Err(Error::VerificationFailed);
            }
            if let Some(seller) = Self::_sole_seller(&record.lines) {
                if receipt.decoded_seller != Some(seller) {
                    return Err(Error::VerificationFailed);
                }
            }
        } else {
            // Direct transfer: destination must be the seller's wallet.
            // Initiation guarantees direct-rail carts have one seller.
            let seller = Self::_sole_seller(&record.lines).ok_or(Error::VerificationFailed)?;
            if receipt.to != seller {
                return Err(Error::VerificationFailed);
            }
        }

        Ok(())
    }

    /// Shared verification for escrow release and refund proofs: bypass or
    /// oracle authorization, canonical escrow id match, replay protection.
    fn _verify_escrow_event(
        env: &Env,
        record: &mut PaymentRecord,
        proof: &EscrowEvent,
    ) -> Result<(), Error> {
        if proof.escrow_id != record.id {
            return Err(Error::VerificationFailed);
        }
        if let Some(owner) = storage::tx_hash_owner(env, &proof.tx_hash) {
            if owner != record.id {
                return Err(Error::ReplayDetected);
            }
        }

        if storage::verify_bypass(env) {
            record.buyer.require_auth();
            record.unverified = true;
            env.events().publish((UNVERIFIED_BYPASS, record.buyer.clone()), record.id);
        } else {
            storage::get_chain_oracle(env)?.require_auth();
        }

        storage::claim_tx_hash(env, &proof.tx_hash, record.id);
        Ok(())
    }

    /// Applies the debit-then-credit pair and advances to terminal success,
    /// or returns false leaving the record untouched.
    ///
    /// Ordering is strict: the batch debit runs first; the impact credit and
    /// snapshot are computed only after it succeeded and only if no snapshot
    /// exists yet; the terminal-success state is set last. The caller
    /// persists the record.
    fn _try_settle(env: &Env, record: &mut PaymentRecord) -> bool {
        if inventory::reserve_and_debit(env, &record.lines).is_err() {
            return false;
        }

        if record.snapshot().is_none() {
            record.impact =
                ImpactAttachment::Snapshot(impact::credit(env, &record.buyer, &record.lines));
        }

        record.state = Self::_success_terminal(&record.rail);
        record.completed_at = Some(env.ledger().timestamp());
        if let Some(mut mirror) = record.mirror() {
            mirror.completed = true;
            record.escrow = EscrowAttachment::Mirror(mirror);
        }

        // Released escrows are announced here so releases that settle through
        // reconciliation reach indexers too, not only the direct path.
        if record.state == PaymentState::EscrowReleased {
            env.events().publish((ESCROW_RELEASED, record.buyer.clone()), record.id);
        }
        env.events().publish((RECORD_SETTLED, record.buyer.clone()), record.id);
        true
    }

    /// Settles a verified record, or parks it in `SettlementDue` when the
    /// debit cannot be applied. Either way the record is persisted and the
    /// resulting state returned — a verified payment is never reported as a
    /// plain failure.
    fn _settle_or_park(env: &Env, record: &mut PaymentRecord) -> PaymentState {
        if !Self::_try_settle(env, record) {
            record.state = PaymentState::SettlementDue;
            env.events().publish((SETTLEMENT_DUE, record.buyer.clone()), record.id);
        }
        storage::set_record(env, record);
        record.state.clone()
    }

    /// Moves a record to `Failed` with a reason and persists it.
    fn _fail(env: &Env, record: &mut PaymentRecord, reason: Symbol) {
        record.state = PaymentState::Failed;
        record.fail_reason = Some(reason.clone());
        record.completed_at = Some(env.ledger().timestamp());
        storage::set_record(env, record);
        env.events().publish((RECORD_FAILED, record.buyer.clone()), (record.id, reason));
    }
}
