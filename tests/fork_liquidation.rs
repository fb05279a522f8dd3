//! Fork-based liquidation simulation against a live deployment.
//!
//! The fork test needs a reachable RPC with the exchange deployed and an
//! `anvil` binary, so it is ignored by default:
//!
//! ```sh
//! PERPLBOT_TEST_RPC=https://... \
//! PERPLBOT_TEST_EXCHANGE=0x... \
//! PERPLBOT_TEST_PERP=16 \
//! PERPLBOT_TEST_ACCOUNT=100 \
//! cargo test --test fork_liquidation -- --ignored
//! ```

use alloy::primitives::Address;

use perplbot::liquidation::{ClosedFormInputs, ForkSimulator, SimConfig, math};

fn env(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.is_empty())
}

#[test]
fn closed_form_matches_the_reference_scenario() {
    // Long, entry 100000, size 1, collateral 10000, maintenance 0.05.
    let price = math::liquidation_price(&ClosedFormInputs {
        entry_price: 100_000.0,
        size: 1.0,
        collateral: 10_000.0,
        maintenance_margin: 0.05,
        long: true,
    })
    .unwrap();
    assert!((price - 94_736.84).abs() < 0.01);
}

#[tokio::test]
#[ignore = "needs a live RPC, a deployed exchange and an anvil binary"]
async fn fork_boundary_stays_near_the_closed_form() {
    let rpc = env("PERPLBOT_TEST_RPC").expect("PERPLBOT_TEST_RPC not set");
    let exchange: Address = env("PERPLBOT_TEST_EXCHANGE")
        .expect("PERPLBOT_TEST_EXCHANGE not set")
        .parse()
        .expect("bad exchange address");
    let perp_id: u64 = env("PERPLBOT_TEST_PERP")
        .expect("PERPLBOT_TEST_PERP not set")
        .parse()
        .unwrap();
    let account_id: u64 = env("PERPLBOT_TEST_ACCOUNT")
        .expect("PERPLBOT_TEST_ACCOUNT not set")
        .parse()
        .unwrap();
    let anvil_path = env("PERPLBOT_TEST_ANVIL").unwrap_or_else(|| "anvil".to_string());

    let simulator = ForkSimulator::new(anvil_path, rpc, exchange, SimConfig::default());
    let report = simulator
        .simulate(perp_id, account_id)
        .await
        .expect("simulation failed");

    if report.already_liquidatable {
        assert_eq!(report.fork_price, Some(report.mark_price));
        return;
    }

    let math_price = report.math_price.expect("closed form missing");
    let fork_price = report.fork_price.expect("fork boundary missing");

    // The closed form ignores funding and close fees; the fork boundary
    // should still land within 1% of it in normal conditions.
    let divergence = (fork_price - math_price).abs() / math_price;
    assert!(
        divergence < 0.01,
        "fork {fork_price} diverges {divergence:.4} from math {math_price}"
    );

    // The boundary sits on the loss side of the mark.
    if report.long {
        assert!(fork_price < report.mark_price);
    } else {
        assert!(fork_price > report.mark_price);
    }
}
