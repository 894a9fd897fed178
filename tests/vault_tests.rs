//! Liquidity vault tests: deposits and provisioning, redemption requests, liquidity
//! separation at issuance, expired and early exits.

use depeg_core::*;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

const MANAGER: Address = Address(1);
const ALICE: Address = Address(10);
const BOB: Address = Address(11);
const CAROL: Address = Address(12);

const DAY: i64 = 86_400;

fn w(value: Decimal) -> Wad {
    Wad::from_decimal(value).unwrap()
}

struct Setup {
    engine: Engine,
    market: MarketId,
    ra: TokenRef,
    lv: TokenRef,
}

fn setup() -> Setup {
    let mut engine = Engine::in_memory(EngineConfig::default(), MANAGER);
    engine.set_time(Timestamp::from_secs(2_000_000));
    let pa = engine.tokens_mut().create_token("PA");
    let ra = engine.tokens_mut().create_token("RA");
    for who in [ALICE, BOB] {
        engine.tokens_mut().mint(ra, who, w(dec!(1000))).unwrap();
        engine.tokens_mut().mint(pa, who, w(dec!(1000))).unwrap();
    }
    let market = engine
        .initialize_market(MANAGER, pa, ra, MarketParams::default())
        .unwrap();
    let lv = engine.market(market).unwrap().lv;
    Setup {
        engine,
        market,
        ra,
        lv,
    }
}

fn issue(s: &mut Setup, early_fee: Wad) -> EpochId {
    let params = EpochParams {
        expiry: s.engine.time().plus_secs(10 * DAY),
        exchange_rate: Wad::ONE,
        repurchase_fee_rate: Wad::ZERO,
        early_redemption_fee_rate: early_fee,
    };
    s.engine.issue_new_epoch(MANAGER, s.market, params).unwrap()
}

fn lock(s: &mut Setup, owner: Address, amount: Wad) {
    s.engine
        .tokens_mut()
        .approve(s.lv, owner, Address::PROTOCOL, amount)
        .unwrap();
    s.engine
        .request_redemption(owner, s.market, amount, &Authorization::PreApproved)
        .unwrap();
}

fn vault(s: &Setup) -> &VaultState {
    &s.engine.market(s.market).unwrap().vault
}

#[test]
fn test_first_deposit_mints_one_to_one() {
    let mut s = setup();
    let shares = s.engine.lv_deposit(ALICE, s.market, w(dec!(100))).unwrap();
    assert_eq!(shares, w(dec!(100)));
    assert_eq!(s.engine.tokens().balance_of(s.lv, ALICE), w(dec!(100)));
    assert_eq!(vault(&s).idle_ra, w(dec!(100)));
    // nothing is provisioned before the first issuance
    assert_eq!(s.engine.tokens().balance_of(s.ra, Address::VAULT), w(dec!(100)));

    assert!(matches!(
        s.engine.lv_deposit(ALICE, s.market, Wad::ZERO),
        Err(ProtocolError::Validation(ValidationError::ZeroDeposit))
    ));
    assert!(matches!(
        s.engine.lv_deposit(CAROL, s.market, w(dec!(1))),
        Err(ProtocolError::State(StateError::InsufficientBalance { .. }))
    ));
}

#[test]
fn test_deposit_during_epoch_is_provisioned() {
    let mut s = setup();
    let epoch = issue(&mut s, Wad::ZERO);
    s.engine.lv_deposit(ALICE, s.market, w(dec!(110))).unwrap();

    let e = s.engine.latest_epoch(s.market).unwrap().clone();
    let reserves = s.engine.amm().current_reserves(e.pool).unwrap();
    let book = *s.engine.epoch_book(s.market, epoch).unwrap();

    // 0.1 RA per CT: 100 RA minted into CT + DS, 10 RA paired in the pool
    assert_eq!(book.locked_ra, w(dec!(100)));
    assert_eq!(reserves.ra, w(dec!(10)));
    assert_eq!(reserves.ct, w(dec!(100)));
    assert!(vault(&s).idle_ra.is_zero());
    assert_eq!(s.engine.tokens().balance_of(e.ds, Address::VAULT), w(dec!(100)));
    assert!(s.engine.amm().lp_balance(e.pool, Address::VAULT).unwrap() > Wad::ZERO);

    // a second deposit follows the pool price, up to sqrt price rounding
    s.engine.lv_deposit(BOB, s.market, w(dec!(11))).unwrap();
    let reserves = s.engine.amm().current_reserves(e.pool).unwrap();
    assert!(reserves.ra > w(dec!(10.99)) && reserves.ra <= w(dec!(11.01)));
    assert!(reserves.ct > w(dec!(109.9)) && reserves.ct <= w(dec!(110.1)));
}

#[test]
fn test_nav_prices_later_deposits() {
    let mut s = setup();
    issue(&mut s, Wad::ZERO);
    s.engine.lv_deposit(ALICE, s.market, w(dec!(110))).unwrap();

    // the locked pool minimum is the only value the vault does not own
    let nav = s.engine.lv_nav_per_share(s.market).unwrap();
    assert!(nav <= Wad::ONE);
    assert!(nav > w(dec!(0.999999)));

    let shares = s.engine.preview_lv_deposit(s.market, w(dec!(50))).unwrap();
    assert!(shares >= w(dec!(50)));
    assert_eq!(s.engine.lv_deposit(BOB, s.market, w(dec!(50))).unwrap(), shares);
}

#[test]
fn test_request_and_transfer_redemption_rights() {
    let mut s = setup();
    s.engine.lv_deposit(ALICE, s.market, w(dec!(100))).unwrap();

    assert!(matches!(
        s.engine
            .request_redemption(ALICE, s.market, w(dec!(10)), &Authorization::PreApproved),
        Err(ProtocolError::Permission(PermissionError::InsufficientAllowance { .. }))
    ));
    lock(&mut s, ALICE, w(dec!(30)));
    assert_eq!(s.engine.locked_balance(s.market, ALICE).unwrap(), w(dec!(30)));
    assert_eq!(s.engine.tokens().balance_of(s.lv, ALICE), w(dec!(70)));
    assert_eq!(s.engine.tokens().balance_of(s.lv, Address::VAULT), w(dec!(30)));

    s.engine
        .transfer_redemption_rights(ALICE, s.market, BOB, w(dec!(10)))
        .unwrap();
    assert_eq!(s.engine.locked_balance(s.market, ALICE).unwrap(), w(dec!(20)));
    assert_eq!(s.engine.locked_balance(s.market, BOB).unwrap(), w(dec!(10)));

    assert!(matches!(
        s.engine
            .transfer_redemption_rights(ALICE, s.market, Address::ZERO, w(dec!(1))),
        Err(ProtocolError::Configuration(ConfigurationError::ZeroAddress))
    ));
    assert!(matches!(
        s.engine
            .transfer_redemption_rights(BOB, s.market, ALICE, w(dec!(11))),
        Err(ProtocolError::State(StateError::InsufficientLockedBalance { .. }))
    ));
}

#[test]
fn test_separation_reserves_locked_share() {
    let mut s = setup();
    s.engine.lv_deposit(ALICE, s.market, w(dec!(100))).unwrap();
    s.engine.lv_deposit(BOB, s.market, w(dec!(100))).unwrap();
    lock(&mut s, ALICE, w(dec!(40)));

    issue(&mut s, Wad::ZERO);
    let snapshot = vault(&s).snapshots[0];
    assert_eq!(snapshot.generation, EpochId(0));
    assert_eq!(snapshot.locked, w(dec!(40)));
    assert_eq!(snapshot.total_weight, w(dec!(200)));
    assert_eq!(snapshot.reserved.ra, w(dec!(40)));
    assert_eq!(snapshot.amm_exposed.ra, w(dec!(160)));
    assert_eq!(vault(&s).covered_locked, w(dec!(40)));

    // the exposed share went into the new pool
    assert!(vault(&s).idle_ra.is_zero());
    assert!(s
        .engine
        .events()
        .iter()
        .any(|e| matches!(e.payload, EventPayload::LiquiditySeparated(_))));
}

#[test]
fn test_covered_redemption_pays_snapshot() {
    let mut s = setup();
    s.engine.lv_deposit(ALICE, s.market, w(dec!(100))).unwrap();
    s.engine.lv_deposit(BOB, s.market, w(dec!(100))).unwrap();
    lock(&mut s, ALICE, w(dec!(40)));
    issue(&mut s, Wad::ZERO);

    let preview = s
        .engine
        .preview_redeem_expired_lv(ALICE, s.market, w(dec!(40)))
        .unwrap();
    let receipt = s
        .engine
        .redeem_expired_lv(ALICE, s.market, CAROL, w(dec!(40)), None)
        .unwrap();
    assert_eq!(receipt, preview);
    assert_eq!(receipt.ra_out, w(dec!(40)));
    assert!(receipt.fee.is_zero());
    assert_eq!(s.engine.tokens().balance_of(s.ra, CAROL), w(dec!(40)));
    assert_eq!(s.engine.tokens().total_supply(s.lv), w(dec!(160)));
    assert!(vault(&s).covered_locked.is_zero());
    assert!(vault(&s).snapshots[0].remaining.ra.is_zero());
}

#[test]
fn test_uncovered_redemption_waits_for_expiry() {
    let mut s = setup();
    s.engine.lv_deposit(ALICE, s.market, w(dec!(100))).unwrap();
    s.engine.lv_deposit(BOB, s.market, w(dec!(100))).unwrap();
    issue(&mut s, Wad::ZERO);

    // locked while epoch 1 runs, so still exposed to the pool
    lock(&mut s, ALICE, w(dec!(20)));
    assert!(matches!(
        s.engine
            .redeem_expired_lv(ALICE, s.market, ALICE, w(dec!(20)), None),
        Err(ProtocolError::State(StateError::RedemptionCapExceeded { .. }))
    ));

    // after expiry the claim draws on reserves, unwinding the pool position on the way
    s.engine.advance_time(10 * DAY);
    let before = s.engine.tokens().balance_of(s.ra, ALICE);
    let receipt = s
        .engine
        .redeem_expired_lv(ALICE, s.market, ALICE, w(dec!(20)), None)
        .unwrap();
    assert!(receipt.ra_out <= w(dec!(20)));
    assert!(receipt.ra_out > w(dec!(19.99)));
    assert_eq!(s.engine.tokens().balance_of(s.ra, ALICE), before + receipt.ra_out);

    let epoch = s.engine.latest_epoch(s.market).unwrap().clone();
    assert!(s.engine.amm().lp_balance(epoch.pool, Address::VAULT).unwrap().is_zero());
    assert!(s.engine.tokens().balance_of(epoch.ds, Address::VAULT).is_zero());
    assert!(s
        .engine
        .events()
        .iter()
        .any(|e| matches!(e.payload, EventPayload::VaultLiquidated(_))));

    // nothing left to unwind at the next issuance
    let next = issue(&mut s, Wad::ZERO);
    assert_eq!(next, EpochId(2));
}

fn approve(s: &mut Setup, token: TokenRef, owner: Address, amount: Wad) {
    s.engine
        .tokens_mut()
        .approve(token, owner, Address::PROTOCOL, amount)
        .unwrap();
}

/// ALICE mints 100 pairs next to the vault's provision, redeems her DS for PA and, after
/// expiry, redeems her CT. what is left in the PSM belongs to the vault's CT alone.
fn expire_after_ct_redemption(s: &mut Setup) -> EpochId {
    let epoch = issue(s, Wad::ZERO);
    s.engine.lv_deposit(BOB, s.market, w(dec!(100))).unwrap();
    let (ct, ds) = {
        let e = s.engine.latest_epoch(s.market).unwrap();
        (e.ct, e.ds)
    };

    s.engine.deposit(ALICE, s.market, w(dec!(100))).unwrap();
    approve(s, ds, ALICE, w(dec!(100)));
    s.engine
        .redeem_with_ds(ALICE, s.market, epoch, w(dec!(100)), &Authorization::PreApproved)
        .unwrap();

    s.engine.advance_time(10 * DAY);
    approve(s, ct, ALICE, w(dec!(100)));
    let redeemed = s
        .engine
        .redeem_with_ct(ALICE, s.market, epoch, w(dec!(100)), &Authorization::PreApproved)
        .unwrap();
    // 100 of ~190.9 CT outstanding
    assert!(redeemed.pa_out > w(dec!(52.38)) && redeemed.pa_out < w(dec!(52.39)));
    epoch
}

#[test]
fn test_issuance_after_ct_redemption_liquidates_pro_rata() {
    let mut s = setup();
    let expired = expire_after_ct_redemption(&mut s);

    let next = issue(&mut s, Wad::ZERO);
    assert_eq!(next, EpochId(2));

    // the vault took its share of both assets, nothing more
    let book = *s.engine.epoch_book(s.market, expired).unwrap();
    assert!(book.locked_ra < w(dec!(0.000001)));
    assert!(book.pa_held < w(dec!(0.000001)));
    assert!(vault(&s).idle_pa > w(dec!(47.61)));
    assert!(vault(&s).idle_pa < w(dec!(47.62)));

    let old = s.engine.market(s.market).unwrap().epoch(expired).unwrap().clone();
    assert!(s.engine.tokens().balance_of(old.ct, Address::VAULT).is_zero());
    assert!(s.engine.tokens().balance_of(old.ds, Address::VAULT).is_zero());
}

#[test]
fn test_uncovered_redemption_after_ct_redemption() {
    let mut s = setup();
    expire_after_ct_redemption(&mut s);
    lock(&mut s, BOB, w(dec!(50)));

    let preview = s
        .engine
        .preview_redeem_expired_lv(BOB, s.market, w(dec!(50)))
        .unwrap();
    let receipt = s
        .engine
        .redeem_expired_lv(BOB, s.market, BOB, w(dec!(50)), None)
        .unwrap();
    assert_eq!(receipt, preview);
    assert!(receipt.pa_out > w(dec!(23.5)));
    assert!(receipt.ra_out > Wad::ZERO);
    issue(&mut s, Wad::ZERO);
}

#[test]
fn test_locks_during_epoch_are_covered_at_next_issuance() {
    let mut s = setup();
    s.engine.lv_deposit(ALICE, s.market, w(dec!(100))).unwrap();
    issue(&mut s, Wad::ZERO);
    lock(&mut s, ALICE, w(dec!(25)));

    s.engine.advance_time(10 * DAY);
    issue(&mut s, Wad::ZERO);

    let snapshot = *vault(&s).snapshots.last().unwrap();
    assert_eq!(snapshot.generation, EpochId(1));
    assert_eq!(snapshot.locked, w(dec!(25)));
    assert_eq!(snapshot.total_weight, w(dec!(100)));
    // a quarter of what the liquidated position returned
    assert!(snapshot.reserved.ra <= w(dec!(25)));
    assert!(snapshot.reserved.ra > w(dec!(24.99)));

    let receipt = s
        .engine
        .redeem_expired_lv(ALICE, s.market, ALICE, w(dec!(25)), None)
        .unwrap();
    assert_eq!(receipt.ra_out, snapshot.reserved.ra);
}

#[test]
fn test_expired_redemption_validates_receiver_and_claim() {
    let mut s = setup();
    s.engine.lv_deposit(ALICE, s.market, w(dec!(100))).unwrap();
    lock(&mut s, ALICE, w(dec!(10)));

    assert!(matches!(
        s.engine
            .redeem_expired_lv(ALICE, s.market, Address::ZERO, w(dec!(10)), None),
        Err(ProtocolError::Configuration(ConfigurationError::ZeroAddress))
    ));
    assert!(matches!(
        s.engine
            .redeem_expired_lv(ALICE, s.market, ALICE, w(dec!(11)), None),
        Err(ProtocolError::State(StateError::InsufficientLockedBalance { .. }))
    ));

    // before the first issuance locked LV draws straight on idle reserves
    let receipt = s
        .engine
        .redeem_expired_lv(ALICE, s.market, ALICE, w(dec!(10)), None)
        .unwrap();
    assert_eq!(receipt.ra_out, w(dec!(10)));
}

#[test]
fn test_early_redemption_fee_is_retained() {
    let mut s = setup();
    s.engine.lv_deposit(ALICE, s.market, w(dec!(100))).unwrap();
    s.engine
        .set_fee_rate(MANAGER, s.market, FeeKind::EarlyRedemption, w(dec!(5)))
        .unwrap();

    let receipt = s
        .engine
        .redeem_early_lv(ALICE, s.market, ALICE, Wad::ONE, None)
        .unwrap();
    assert_eq!(receipt.ra_out, w(dec!(0.95)));
    assert_eq!(receipt.fee, w(dec!(0.05)));
    assert_eq!(vault(&s).idle_ra, w(dec!(99.05)));
    assert_eq!(vault(&s).fees_retained, w(dec!(0.05)));
    assert_eq!(s.engine.tokens().total_supply(s.lv), w(dec!(99)));

    // Bob holds no LV
    assert!(matches!(
        s.engine.redeem_early_lv(BOB, s.market, BOB, Wad::ONE, None),
        Err(ProtocolError::State(StateError::InsufficientBalance { .. }))
    ));
}

#[test]
fn test_early_redemption_unwinds_pool_share() {
    let mut s = setup();
    issue(&mut s, Wad::ZERO);
    s.engine.lv_deposit(ALICE, s.market, w(dec!(110))).unwrap();

    let preview = s
        .engine
        .preview_redeem_early_lv(s.market, w(dec!(55)))
        .unwrap();
    let receipt = s
        .engine
        .redeem_early_lv(ALICE, s.market, BOB, w(dec!(55)), None)
        .unwrap();
    assert_eq!(receipt, preview);
    assert!(receipt.ra_out <= w(dec!(55)));
    assert!(receipt.ra_out > w(dec!(54.99)));
    assert_eq!(s.engine.tokens().balance_of(s.ra, BOB), w(dec!(1000)) + receipt.ra_out);

    // early exits close with the epoch
    s.engine.advance_time(10 * DAY);
    assert!(matches!(
        s.engine.redeem_early_lv(ALICE, s.market, ALICE, Wad::ONE, None),
        Err(ProtocolError::State(StateError::EpochExpired { .. }))
    ));
}

#[test]
fn test_early_redemption_with_permit() {
    let mut s = setup();
    s.engine.lv_deposit(ALICE, s.market, w(dec!(10))).unwrap();
    let deadline = s.engine.time().plus_secs(600);
    let permit = Authorization::SignedPermit {
        amount: w(dec!(4)),
        deadline,
        signature: s
            .engine
            .tokens()
            .sign_permit(s.lv, ALICE, Address::PROTOCOL, w(dec!(4)), deadline),
    };
    s.engine
        .redeem_early_lv(ALICE, s.market, ALICE, w(dec!(4)), Some(&permit))
        .unwrap();
    assert!(matches!(
        s.engine
            .redeem_early_lv(ALICE, s.market, ALICE, w(dec!(4)), Some(&permit)),
        Err(ProtocolError::Permission(PermissionError::Permit(TokenError::InvalidSignature)))
    ));
}

#[test]
fn test_paused_vault_operations_fail() {
    let mut s = setup();
    s.engine.lv_deposit(ALICE, s.market, w(dec!(10))).unwrap();
    let market = s.market;

    s.engine
        .access_mut()
        .set_paused(MANAGER, market, Operation::LvDeposit, true)
        .unwrap();
    assert!(matches!(
        s.engine.lv_deposit(ALICE, market, w(dec!(1))),
        Err(ProtocolError::Paused(PausedError::LvDepositPaused))
    ));

    s.engine
        .access_mut()
        .set_paused(MANAGER, market, Operation::LvWithdrawal, true)
        .unwrap();
    assert!(matches!(
        s.engine
            .request_redemption(ALICE, market, w(dec!(1)), &Authorization::PreApproved),
        Err(ProtocolError::Paused(PausedError::LvWithdrawalPaused))
    ));
    assert!(matches!(
        s.engine.redeem_early_lv(ALICE, market, ALICE, w(dec!(1)), None),
        Err(ProtocolError::Paused(PausedError::LvWithdrawalPaused))
    ));
}
