use settings::Settings;

use crate::adapter::FileStore;
use crate::core::time::DateTime;
use crate::heating::{Demand, Engine};
use crate::home::geometry::House;
use crate::home::items::Item;
use crate::port::ValueStore;

mod adapter;
mod core;
mod heating;
mod home;
mod port;
mod settings;

#[tokio::main(flavor = "multi_thread")]
async fn main() {
    let settings = Settings::new().expect("Error reading configuration");
    settings.monitoring.init().expect("Error initializing logging");

    let house = House::new(&settings.house).expect("Invalid house geometry");
    let store = FileStore::load(&settings.store.path).expect("Error loading value store");

    let mut engine = Engine::new(house, settings.calibration.clone(), settings.location.clone());

    tracing::info!(
        "Heating engine started, evaluating every {} s",
        settings.engine.cycle_seconds
    );

    let mut interval =
        tokio::time::interval(std::time::Duration::from_secs(settings.engine.cycle_seconds));

    loop {
        interval.tick().await;

        let now = t!(now);
        if let Err(e) = run_cycle(&mut engine, &store, now) {
            tracing::error!("Heating evaluation failed: {e:#}");
        }
    }
}

fn run_cycle(engine: &mut Engine, store: &FileStore, now: DateTime) -> anyhow::Result<()> {
    let heating_active = store.decimal(&Item::HeatingPower)? > 0.0;

    let (cr, hhs) = engine.calculate(store, now, heating_active)?;

    for rhs in hhs.rooms() {
        let demand_energy = match rhs.demand() {
            Demand::Amount { energy, .. } => energy,
            _ => 0.0,
        };
        store.update_decimal(&Item::HeatingDemand(rhs.room.clone()), demand_energy, now)?;

        if let Some(rs) = cr.room(&rhs.room) {
            store.update_decimal(&Item::ChargedBuffer(rhs.room.clone()), rs.charged_energy, now)?;
        }
    }

    if hhs.heating_requested {
        tracing::info!("Heating requested");
    }

    Ok(())
}
