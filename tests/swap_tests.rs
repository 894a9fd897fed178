//! Flash swap tests against a pool seeded by the vault.

use depeg_core::*;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

const MANAGER: Address = Address(1);
const LP: Address = Address(10);
const TRADER: Address = Address(11);

fn w(value: Decimal) -> Wad {
    Wad::from_decimal(value).unwrap()
}

/// Market with a running epoch and 10 RA / 100 CT in its pool.
fn seeded() -> (Engine, MarketId, Epoch) {
    let mut engine = Engine::in_memory(EngineConfig::default(), MANAGER);
    engine.set_time(Timestamp::from_secs(3_000_000));
    let pa = engine.tokens_mut().create_token("PA");
    let ra = engine.tokens_mut().create_token("RA");
    engine.tokens_mut().mint(ra, LP, w(dec!(1000))).unwrap();
    engine.tokens_mut().mint(ra, TRADER, w(dec!(100))).unwrap();

    let market = engine
        .initialize_market(MANAGER, pa, ra, MarketParams::default())
        .unwrap();
    let params = EpochParams {
        expiry: engine.time().plus_secs(86_400),
        exchange_rate: Wad::ONE,
        repurchase_fee_rate: Wad::ZERO,
        early_redemption_fee_rate: Wad::ZERO,
    };
    engine.issue_new_epoch(MANAGER, market, params).unwrap();
    engine.lv_deposit(LP, market, w(dec!(110))).unwrap();
    let epoch = engine.latest_epoch(market).unwrap().clone();
    (engine, market, epoch)
}

#[test]
fn test_swap_ra_for_ds_mints_backed_pair() {
    let (mut engine, market, epoch) = seeded();
    let ra = engine.market(market).unwrap().ra;
    let locked_before = engine.epoch_book(market, epoch.id).unwrap().locked_ra;

    let preview = engine.preview_swap_ra_for_ds(market, Wad::ONE).unwrap();
    let sale = engine
        .swap_ra_for_ds(TRADER, market, Wad::ONE, Wad::ZERO)
        .unwrap();
    assert_eq!(sale, preview);
    assert_eq!(sale.ds_out, sale.ra_borrowed + Wad::ONE);
    assert!(sale.ra_borrowed > Wad::ZERO);

    assert_eq!(engine.tokens().balance_of(epoch.ds, TRADER), sale.ds_out);
    assert_eq!(
        engine.tokens().balance_of(ra, TRADER),
        w(dec!(99)) + sale.ra_refund
    );
    // every DS sold is fully backed in the PSM
    assert_eq!(
        engine.epoch_book(market, epoch.id).unwrap().locked_ra,
        locked_before + sale.ds_out
    );
    let reserves = engine.amm().current_reserves(epoch.pool).unwrap();
    assert_eq!(reserves.ct, w(dec!(100)) + sale.ds_out);
    assert_eq!(engine.tokens().balance_of(epoch.ct, Address::AMM), reserves.ct);
}

#[test]
fn test_swap_ra_for_ds_respects_minimum() {
    let (mut engine, market, _) = seeded();
    let quoted = engine.preview_swap_ra_for_ds(market, Wad::ONE).unwrap();
    assert!(matches!(
        engine.swap_ra_for_ds(TRADER, market, Wad::ONE, quoted.ds_out + Wad::ONE),
        Err(ProtocolError::Pricing(PricingError::InsufficientOutput { .. }))
    ));
    assert!(matches!(
        engine.swap_ra_for_ds(TRADER, market, w(dec!(1000)), Wad::ZERO),
        Err(ProtocolError::State(StateError::InsufficientBalance { .. }))
    ));
}

#[test]
fn test_swap_ds_for_ra_cancels_pair() {
    let (mut engine, market, epoch) = seeded();
    let sale = engine
        .swap_ra_for_ds(TRADER, market, Wad::ONE, Wad::ZERO)
        .unwrap();
    let ds = w(dec!(0.5));
    let ra = engine.market(market).unwrap().ra;
    let ra_before = engine.tokens().balance_of(ra, TRADER);
    let book_before = *engine.epoch_book(market, epoch.id).unwrap();

    let preview = engine.preview_swap_ds_for_ra(market, ds).unwrap();
    let purchase = engine.swap_ds_for_ra(TRADER, market, ds, Wad::ZERO).unwrap();
    assert_eq!(purchase, preview);
    // the pair unlocks `ds` RA, the pool keeps its cut
    assert_eq!(purchase.ra_out + purchase.ra_cost, ds);
    assert_eq!(engine.tokens().balance_of(ra, TRADER), ra_before + purchase.ra_out);
    assert_eq!(engine.tokens().balance_of(epoch.ds, TRADER), sale.ds_out.saturating_sub(ds));
    assert_eq!(engine.tokens().balance_of(epoch.ct, TRADER), purchase.ct_refund);

    let book = engine.epoch_book(market, epoch.id).unwrap();
    assert_eq!(book.locked_ra, book_before.locked_ra.saturating_sub(ds));
    assert_eq!(book.ct_retired, book_before.ct_retired + ds);
}

#[test]
fn test_swaps_need_a_running_epoch() {
    let (mut engine, market, _) = seeded();
    engine
        .swap_ra_for_ds(TRADER, market, Wad::ONE, Wad::ZERO)
        .unwrap();
    engine.advance_time(86_400);
    assert!(matches!(
        engine.swap_ra_for_ds(TRADER, market, Wad::ONE, Wad::ZERO),
        Err(ProtocolError::State(StateError::EpochExpired { .. }))
    ));
    assert!(matches!(
        engine.swap_ds_for_ra(TRADER, market, w(dec!(0.1)), Wad::ZERO),
        Err(ProtocolError::State(StateError::EpochExpired { .. }))
    ));
}

#[test]
fn test_swaps_follow_psm_pause_flags() {
    let (mut engine, market, _) = seeded();
    engine
        .access_mut()
        .set_paused(MANAGER, market, Operation::PsmDeposit, true)
        .unwrap();
    assert!(matches!(
        engine.swap_ra_for_ds(TRADER, market, Wad::ONE, Wad::ZERO),
        Err(ProtocolError::Paused(PausedError::PsmDepositPaused))
    ));
    engine
        .access_mut()
        .set_paused(MANAGER, market, Operation::PsmWithdrawal, true)
        .unwrap();
    assert!(matches!(
        engine.swap_ds_for_ra(TRADER, market, Wad::ONE, Wad::ZERO),
        Err(ProtocolError::Paused(PausedError::PsmWithdrawalPaused))
    ));
}
