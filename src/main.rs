//! Depeg protection core simulation.
//!
//! Walks one market through two epochs: PSM deposits and redemptions, repurchase,
//! vault deposits provisioned into the pool, a flash swap, redemption requests,
//! expiry, re-issuance with liquidity separation, and both LV exit paths.

use depeg_core::*;
use rust_decimal_macros::dec;

const MANAGER: Address = Address(1);
const ALICE: Address = Address(10);
const BOB: Address = Address(11);
const CAROL: Address = Address(12);

const DAY: i64 = 86_400;

fn wad(value: rust_decimal::Decimal) -> Wad {
    Wad::from_decimal(value).unwrap()
}

fn main() {
    println!("Depeg Protection Core Simulation");
    println!("One market, two epochs, PSM and vault\n");

    let config = EngineConfig::with_protocol(Environment::Testnet.config());
    config.validate().unwrap();
    let mut engine = Engine::in_memory(config, MANAGER);
    engine.set_time(Timestamp::from_secs(1_700_000_000));

    let pa = engine.tokens_mut().create_token("stETH");
    let ra = engine.tokens_mut().create_token("WETH");
    for who in [ALICE, BOB, CAROL] {
        engine.tokens_mut().mint(ra, who, wad(dec!(1000))).unwrap();
        engine.tokens_mut().mint(pa, who, wad(dec!(1000))).unwrap();
    }

    let params = engine.config().protocol.market_defaults;
    let market = engine.initialize_market(MANAGER, pa, ra, params).unwrap();
    println!("Scenario 1: Market {market} initialized\n");

    let epoch_params = |expiry: Timestamp| EpochParams {
        expiry,
        exchange_rate: Wad::ONE,
        repurchase_fee_rate: wad(dec!(0.5)),
        early_redemption_fee_rate: wad(dec!(5)),
    };
    let first_expiry = engine.time().plus_secs(30 * DAY);
    let epoch1 = engine
        .issue_new_epoch(MANAGER, market, epoch_params(first_expiry))
        .unwrap();
    println!("  Epoch {epoch1} issued, expires {first_expiry}\n");

    scenario_psm(&mut engine, market, epoch1);
    scenario_vault(&mut engine, market);
    scenario_rollover(&mut engine, market, epoch_params);

    println!("\nEvents recorded: {}", engine.events().len());
    println!("All simulations completed successfully.");
}

fn scenario_psm(engine: &mut Engine, market: MarketId, epoch: EpochId) {
    println!("Scenario 2: PSM deposit, DS redemption, repurchase\n");

    let minted = engine.deposit(ALICE, market, wad(dec!(100))).unwrap();
    println!("  Alice deposits 100 RA, receives {minted} CT + {minted} DS");

    let redemption = engine
        .redeem_with_ds(ALICE, market, epoch, wad(dec!(40)), &permit(engine, market, epoch, ALICE, wad(dec!(40))))
        .unwrap();
    println!(
        "  Alice redeems 40 DS with 40 PA for {} RA (fee {})",
        redemption.ra_out, redemption.fee
    );

    let receipt = engine.repurchase(BOB, market, wad(dec!(10))).unwrap();
    println!(
        "  Bob repurchases with 10 RA, receives {} PA (fee {})\n",
        receipt.pa_out, receipt.fee
    );
}

fn permit(engine: &Engine, market: MarketId, epoch: EpochId, owner: Address, amount: Wad) -> Authorization {
    let ds = engine.market(market).unwrap().epoch(epoch).unwrap().ds;
    let deadline = engine.time().plus_secs(3600);
    Authorization::SignedPermit {
        amount,
        deadline,
        signature: engine
            .tokens()
            .sign_permit(ds, owner, Address::PROTOCOL, amount, deadline),
    }
}

fn scenario_vault(engine: &mut Engine, market: MarketId) {
    println!("Scenario 3: Vault deposits and a flash swap\n");

    let bob_shares = engine.lv_deposit(BOB, market, wad(dec!(200))).unwrap();
    let carol_shares = engine.lv_deposit(CAROL, market, wad(dec!(100))).unwrap();
    println!("  Bob deposits 200 RA for {bob_shares} LV, Carol deposits 100 RA for {carol_shares} LV");

    let epoch = engine.latest_epoch(market).unwrap().clone();
    let reserves = engine.amm().current_reserves(epoch.pool).unwrap();
    println!("  Pool reserves: {} RA / {} CT", reserves.ra, reserves.ct);

    let sale = engine
        .swap_ra_for_ds(ALICE, market, wad(dec!(1)), Wad::ZERO)
        .unwrap();
    println!(
        "  Alice pays 1 RA for {} DS (pool lent {} RA)",
        sale.ds_out, sale.ra_borrowed
    );

    let lv = engine.market(market).unwrap().lv;
    engine
        .tokens_mut()
        .approve(lv, BOB, Address::PROTOCOL, wad(dec!(50)))
        .unwrap();
    engine
        .request_redemption(BOB, market, wad(dec!(50)), &Authorization::PreApproved)
        .unwrap();
    println!(
        "  Bob locks 50 LV for redemption, NAV per share {}\n",
        engine.lv_nav_per_share(market).unwrap()
    );
}

fn scenario_rollover(
    engine: &mut Engine,
    market: MarketId,
    epoch_params: impl Fn(Timestamp) -> EpochParams,
) {
    println!("Scenario 4: Expiry, re-issuance and LV exits\n");

    engine.advance_time(30 * DAY);
    let second_expiry = engine.time().plus_secs(30 * DAY);
    let epoch2 = engine
        .issue_new_epoch(MANAGER, market, epoch_params(second_expiry))
        .unwrap();
    let snapshot = *engine.market(market).unwrap().vault.snapshots.last().unwrap();
    println!(
        "  Epoch {epoch2} issued. reserved for locked LV: {} RA / {} PA",
        snapshot.reserved.ra, snapshot.reserved.pa
    );

    let expired = engine
        .redeem_expired_lv(BOB, market, BOB, wad(dec!(50)), None)
        .unwrap();
    println!("  Bob redeems 50 locked LV for {} RA and {} PA", expired.ra_out, expired.pa_out);

    let early = engine
        .redeem_early_lv(CAROL, market, CAROL, wad(dec!(20)), None)
        .unwrap();
    println!(
        "  Carol exits 20 LV early for {} RA, {} retained as fee",
        early.ra_out, early.fee
    );

    for who in [ALICE, BOB, CAROL] {
        let market_state = engine.market(market).unwrap();
        println!(
            "  {:?}: {} RA, {} PA, {} LV",
            who,
            engine.tokens().balance_of(market_state.ra, who),
            engine.tokens().balance_of(market_state.pa, who),
            engine.tokens().balance_of(market_state.lv, who)
        );
    }
}
