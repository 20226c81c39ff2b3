//! 出料阈值性质测试

use proptest::prelude::*;
use std::time::Duration;
use tote_sensor::SimulatedScale;
use tote_station::{
    FillConfig, ManualClock, MemoryOutputs, TimingConfig, ToteFillOrchestrator, ToteFillState,
    Valve,
};

const START_KG: f64 = 10.0;

fn weight(centi: u32) -> f64 {
    START_KG + centi as f64 / 100.0
}

proptest! {
    /// 单调增重序列下：阀门开关与状态一致，最终状态只取决于最大增量
    #[test]
    fn test_thresholds_follow_monotonic_weight(steps in prop::collection::vec(0u32..60, 1..40)) {
        let scale = SimulatedScale::new(START_KG);
        let handle = scale.handle();
        let clock = ManualClock::new();
        let mut station = ToteFillOrchestrator::builder(
            Box::new(scale),
            Box::new(MemoryOutputs::new()),
        )
        .timing(TimingConfig { idle_weight_poll_ms: 0, ..TimingConfig::default() })
        .clock(clock.clone())
        .build()
        .unwrap();

        let mut centi = 0u32;
        let mut readings = vec![START_KG];
        for step in &steps {
            centi += step;
            readings.push(weight(centi));
        }
        handle.push_readings(&readings);
        handle.set_gross_kg(weight(centi));

        station.request_start().unwrap();
        for _ in 0..readings.len() + 4 {
            clock.advance(Duration::from_millis(20));
            let state = station.tick();
            prop_assert_eq!(station.valve_open(Valve::Ice), state == ToteFillState::DispensingIce);
            prop_assert_eq!(station.valve_open(Valve::Water), state == ToteFillState::DispensingWater);
            if state == ToteFillState::WaitingId {
                break;
            }
        }

        let expected = match centi {
            c if c < 200 => ToteFillState::DispensingIce,
            c if c < 400 => ToteFillState::DispensingWater,
            _ => ToteFillState::WaitingId,
        };
        prop_assert_eq!(station.state(), expected);

        let batch = station.batch();
        if let Some(ice) = batch.ice_out_kg() {
            prop_assert!(ice >= 2.0 - 1e-9, "ice {} below target", ice);
        }
        if let (Some(ice), Some(water)) = (batch.ice_out_kg(), batch.water_out_kg()) {
            prop_assert!(water >= 0.0);
            prop_assert!(ice + water >= 4.0 - 0.011, "ice {} + water {}", ice, water);
            prop_assert!(ice + water <= centi as f64 / 100.0 + 0.011);
        }
    }

    /// 任意配置的目标值都被当作阈值使用
    #[test]
    fn test_ice_threshold_uses_configured_target(target_centi in 10u32..500) {
        let target = target_centi as f64 / 100.0;
        let scale = SimulatedScale::new(START_KG);
        let handle = scale.handle();
        let mut station = ToteFillOrchestrator::builder(
            Box::new(scale),
            Box::new(MemoryOutputs::new()),
        )
        .fill(FillConfig { target_ice_kg: target, ..FillConfig::default() })
        .timing(TimingConfig { idle_weight_poll_ms: 0, ..TimingConfig::default() })
        .clock(ManualClock::new())
        .build()
        .unwrap();

        station.request_start().unwrap();
        prop_assert_eq!(station.tick(), ToteFillState::DispensingIce);

        handle.set_gross_kg(weight(target_centi - 1));
        prop_assert_eq!(station.tick(), ToteFillState::DispensingIce);
        handle.set_gross_kg(weight(target_centi + 1));
        prop_assert_eq!(station.tick(), ToteFillState::DispensingWater);
        let ice = station.batch().ice_out_kg().unwrap_or(0.0);
        prop_assert!((ice - (target + 0.01)).abs() < 1e-9, "ice {} for target {}", ice, target);
    }
}
