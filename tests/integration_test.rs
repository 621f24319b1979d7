//! Integration tests for the evaluation engine.
//!
//! Tests cover:
//! - The reference equations end to end against a mock store
//! - Memoization of shared sub-equations
//! - Cycle and unknown-reference detection at evaluation time
//! - Missing-value propagation and universe restriction
//! - Point-in-time discipline (no requested date after the as-of date)
//! - Store failures abort the whole calculation
//! - CSV and SQLite adapters agree with each other end to end

mod common;

use approx::assert_relative_eq;
use common::*;
use pitcalc::adapters::csv_adapter::CsvAdapter;
use pitcalc::domain::calendar::{Frequency, WeekdayCalendar};
use pitcalc::domain::engine::{calculate, Engine};
use pitcalc::domain::equation::{Equation, FundamentalAgg, MarketAgg};
use pitcalc::domain::error::PitcalcError;
use pitcalc::domain::operator::Operator;
use pitcalc::domain::registry::EquationRegistry;

fn calendar() -> WeekdayCalendar {
    WeekdayCalendar::default()
}

mod reference_equations {
    use super::*;

    #[test]
    fn e2p_for_single_security() {
        let port = scenario_x();
        let registry = EquationRegistry::standard();
        let values = calculate("e2p", "Backtest", as_of(), &registry, &port, &calendar()).unwrap();

        assert_eq!(values.len(), 1);
        assert_relative_eq!(values.get("X").unwrap(), 0.01, epsilon = 1e-12);
    }

    #[test]
    fn marketcap_and_earnings() {
        let port = scenario_x();
        let registry = EquationRegistry::standard();
        let cal = calendar();
        let engine = Engine::new(&registry, &port, &cal);

        let mcap = engine.calculate("marketcap", "Backtest", as_of()).unwrap();
        assert_relative_eq!(mcap.get("X").unwrap(), 1000.0);

        let earnings = engine.calculate("earnings", "Backtest", as_of()).unwrap();
        assert_relative_eq!(earnings.get("X").unwrap(), 10.0);
    }

    #[test]
    fn range_52w_position_in_weekly_range() {
        // 52 Friday closes 1..=52, the latest replaced by 26.5:
        // min 1, max 51, close 26.5 -> 0.51
        let mut closes: Vec<f64> = (1..=52).map(f64::from).collect();
        closes[51] = 26.5;
        let port = MockDataPort::new()
            .with_members("Backtest", &["X"])
            .with_weekly("close", "X", date(2019, 3, 29), &closes);

        let registry = EquationRegistry::standard();
        let values =
            calculate("range_52w", "Backtest", as_of(), &registry, &port, &calendar()).unwrap();
        assert_relative_eq!(values.get("X").unwrap(), 0.51, epsilon = 1e-12);
    }

    #[test]
    fn range_52w_flat_prices_is_missing() {
        let closes = vec![7.0; 52];
        let port = MockDataPort::new()
            .with_members("Backtest", &["X"])
            .with_weekly("close", "X", date(2019, 3, 29), &closes);

        let registry = EquationRegistry::standard();
        let values =
            calculate("range_52w", "Backtest", as_of(), &registry, &port, &calendar()).unwrap();
        assert!(values.contains("X"));
        assert!(values.is_missing("X"));
    }

    #[test]
    fn earnings_skips_unreported_quarter() {
        // Q1 2019 not reported until May: only three quarters visible
        let port = MockDataPort::new()
            .with_members("Backtest", &["X"])
            .with_fundamental("net_income", "X", date(2018, 6, 30), date(2018, 8, 1), 1.0)
            .with_fundamental("net_income", "X", date(2018, 9, 30), date(2018, 11, 1), 2.0)
            .with_fundamental("net_income", "X", date(2018, 12, 31), date(2019, 2, 1), 3.0)
            .with_fundamental("net_income", "X", date(2019, 3, 31), date(2019, 5, 1), 4.0);

        let registry = EquationRegistry::standard();
        let values =
            calculate("earnings", "Backtest", as_of(), &registry, &port, &calendar()).unwrap();
        assert_relative_eq!(values.get("X").unwrap(), 6.0);
    }
}

mod memoization {
    use super::*;

    #[test]
    fn repeated_reference_fetches_once() {
        let port = scenario_x();
        let registry = EquationRegistry::standard().with(
            "double_earnings",
            Equation::op(
                Operator::Add,
                Equation::named("earnings"),
                Equation::named("earnings"),
            ),
        );
        let cal = calendar();
        let calc = Engine::new(&registry, &port, &cal)
            .run("double_earnings", "Backtest", as_of())
            .unwrap();

        assert_relative_eq!(calc.values.get("X").unwrap(), 20.0);
        assert_eq!(port.fundamental_calls.get(), 1);
        assert_eq!(calc.stats.memo_hits, 1);
    }

    #[test]
    fn e2p_touches_each_item_once() {
        let port = scenario_x();
        let registry = EquationRegistry::standard();
        calculate("e2p", "Backtest", as_of(), &registry, &port, &calendar()).unwrap();

        assert_eq!(port.market_calls.get(), 2);
        assert_eq!(port.fundamental_calls.get(), 1);
        assert_eq!(port.universe_calls.get(), 1);
    }

    #[test]
    fn range_52w_shares_one_weekly_fetch() {
        let port = MockDataPort::new()
            .with_members("Backtest", &["X"])
            .with_weekly("close", "X", date(2019, 3, 29), &[1.0; 52]);
        let registry = EquationRegistry::standard();
        calculate("range_52w", "Backtest", as_of(), &registry, &port, &calendar()).unwrap();

        // monthly close + one shared 52-week window
        assert_eq!(port.market_calls.get(), 2);
    }

    #[test]
    fn separate_calls_do_not_share_state() {
        let port = scenario_x();
        let registry = EquationRegistry::standard();
        let cal = calendar();
        let engine = Engine::new(&registry, &port, &cal);
        engine.calculate("earnings", "Backtest", as_of()).unwrap();
        engine.calculate("earnings", "Backtest", as_of()).unwrap();
        assert_eq!(port.fundamental_calls.get(), 2);
    }
}

mod structural_errors {
    use super::*;

    #[test]
    fn mutual_recursion_is_a_cycle() {
        let port = scenario_x();
        let registry = EquationRegistry::new()
            .with("A", Equation::op(Operator::Add, Equation::named("B"), Equation::market("close")))
            .with("B", Equation::named("A"));

        let err = calculate("A", "Backtest", as_of(), &registry, &port, &calendar()).unwrap_err();
        match err {
            PitcalcError::CyclicReference { path } => assert_eq!(path, vec!["A", "B", "A"]),
            other => panic!("expected CyclicReference, got {other:?}"),
        }
    }

    #[test]
    fn unknown_reference() {
        let port = scenario_x();
        let registry = EquationRegistry::new().with("pe", Equation::named("eps"));
        let err = calculate("pe", "Backtest", as_of(), &registry, &port, &calendar()).unwrap_err();
        assert!(matches!(err, PitcalcError::UnknownEquation { name } if name == "eps"));
    }

    #[test]
    fn zero_period_window_is_invalid() {
        let port = scenario_x();
        let registry = EquationRegistry::new().with(
            "bad",
            Equation::market_window("close", 0, Frequency::Weeks, MarketAgg::Max),
        );
        let err = calculate("bad", "Backtest", as_of(), &registry, &port, &calendar()).unwrap_err();
        assert!(matches!(err, PitcalcError::InvalidRange { .. }));
        assert_eq!(port.store_calls(), 0);
    }

    #[test]
    fn single_quarter_with_sum_is_invalid() {
        let port = scenario_x();
        let registry = EquationRegistry::new()
            .with("q", Equation::fundamental("net_income", 1, FundamentalAgg::Sum));
        let err = calculate("q", "Backtest", as_of(), &registry, &port, &calendar()).unwrap_err();
        assert!(matches!(err, PitcalcError::InvalidRange { .. }));
    }
}

mod missing_values {
    use super::*;

    #[test]
    fn missing_operand_propagates() {
        let port = scenario_x()
            .with_members("Backtest", &["X", "Y"])
            .with_market("close", "Y", date(2019, 3, 29), 5.0);
        let registry = EquationRegistry::standard();
        let values = calculate("e2p", "Backtest", as_of(), &registry, &port, &calendar()).unwrap();

        assert_eq!(values.len(), 2);
        assert!(values.get("X").is_some());
        assert!(values.contains("Y"));
        assert!(values.is_missing("Y"));
    }

    #[test]
    fn stale_price_is_missing() {
        let port = MockDataPort::new()
            .with_members("Backtest", &["X"])
            .with_market("close", "X", date(2019, 2, 28), 10.0)
            .with_market("shares", "X", date(2019, 3, 29), 100.0);
        let registry = EquationRegistry::standard();
        let values =
            calculate("marketcap", "Backtest", as_of(), &registry, &port, &calendar()).unwrap();
        assert!(values.is_missing("X"));
    }

    #[test]
    fn zero_marketcap_yields_missing_e2p() {
        let port = scenario_x().with_market("shares", "X", date(2019, 3, 30), 0.0);
        let registry = EquationRegistry::standard();
        let values = calculate("e2p", "Backtest", as_of(), &registry, &port, &calendar()).unwrap();
        assert!(values.is_missing("X"));
    }
}

mod universe_restriction {
    use super::*;

    #[test]
    fn output_keys_match_universe() {
        let port = scenario_x()
            .with_members("Backtest", &["X", "W"])
            .with_market("close", "Z", date(2019, 3, 29), 1.0)
            .with_market("shares", "Z", date(2019, 3, 29), 1.0);
        let registry = EquationRegistry::standard();
        let values =
            calculate("marketcap", "Backtest", as_of(), &registry, &port, &calendar()).unwrap();

        let ids: Vec<_> = values.ids().cloned().collect();
        assert_eq!(ids, vec!["W", "X"]);
        assert!(values.is_missing("W"));
    }

    #[test]
    fn empty_universe_gives_empty_result() {
        let port = scenario_x();
        let registry = EquationRegistry::standard();
        let values = calculate("e2p", "Nobody", as_of(), &registry, &port, &calendar()).unwrap();
        assert!(values.is_empty());
    }
}

mod point_in_time {
    use super::*;

    #[test]
    fn no_requested_date_after_as_of() {
        let port = scenario_x();
        let registry = EquationRegistry::standard();
        let cal = calendar();
        let engine = Engine::new(&registry, &port, &cal);
        for name in ["e2p", "range_52w"] {
            engine.calculate(name, "Backtest", as_of()).unwrap();
        }

        for (item, dates) in port.requested.borrow().iter() {
            assert!(dates.iter().all(|d| *d <= as_of()), "{item}: {dates:?}");
            assert!(dates.windows(2).all(|w| w[0] > w[1]), "{item}: {dates:?}");
        }
        assert!(port.fundamental_as_of.borrow().iter().all(|d| *d == as_of()));
    }

    #[test]
    fn later_price_is_invisible() {
        let port = scenario_x().with_market("close", "X", date(2019, 4, 1), 99.0);
        let registry = EquationRegistry::standard();
        let values =
            calculate("marketcap", "Backtest", as_of(), &registry, &port, &calendar()).unwrap();
        assert_relative_eq!(values.get("X").unwrap(), 1000.0);
    }
}

mod store_failures {
    use super::*;

    #[test]
    fn data_access_error_aborts_calculation() {
        let port = scenario_x().with_error("shares", "connection reset");
        let registry = EquationRegistry::standard();
        let err = calculate("e2p", "Backtest", as_of(), &registry, &port, &calendar()).unwrap_err();
        match err {
            PitcalcError::DataAccess { reason } => assert_eq!(reason, "connection reset"),
            other => panic!("expected DataAccess, got {other:?}"),
        }
    }
}

mod adapter_parity {
    use super::*;

    #[cfg(feature = "sqlite")]
    #[test]
    fn csv_and_sqlite_agree_on_reference_equations() {
        use pitcalc::adapters::sqlite_adapter::SqliteAdapter;

        let (market, fundamentals, memberships) = scenario_records();
        let sqlite = SqliteAdapter::in_memory().unwrap();
        sqlite.initialize_schema().unwrap();
        sqlite.insert_market(&market).unwrap();
        sqlite.insert_fundamentals(&fundamentals).unwrap();
        sqlite.insert_memberships(&memberships).unwrap();

        let csv = CsvAdapter::from_records(market, fundamentals, memberships);
        let registry = EquationRegistry::standard();
        let cal = calendar();

        for name in ["marketcap", "earnings", "e2p"] {
            let from_sqlite = calculate(name, "Backtest", as_of(), &registry, &sqlite, &cal).unwrap();
            let from_csv = calculate(name, "Backtest", as_of(), &registry, &csv, &cal).unwrap();
            assert_eq!(from_sqlite, from_csv, "{name}");
        }

        let e2p = calculate("e2p", "Backtest", as_of(), &registry, &sqlite, &cal).unwrap();
        assert_relative_eq!(e2p.get("X").unwrap(), 0.01, epsilon = 1e-12);
        assert!(e2p.is_missing("Y"));
    }

    #[test]
    fn csv_records_e2p() {
        let (market, fundamentals, memberships) = scenario_records();
        let csv = CsvAdapter::from_records(market, fundamentals, memberships);
        let registry = EquationRegistry::standard();
        let values = calculate("e2p", "Backtest", as_of(), &registry, &csv, &calendar()).unwrap();
        assert_relative_eq!(values.get("X").unwrap(), 0.01, epsilon = 1e-12);
    }
}
