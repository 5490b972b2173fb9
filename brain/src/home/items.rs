use std::fmt::Display;

/// Logical names of the values the engine reads from the last-known-value
/// store. Replaces the string-formatted item names of classic openHAB setups
/// with a typed identifier that can serve as a cache key.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Item {
    Temperature(String),
    TargetTemperature(String),
    ChargedBuffer(String),
    HeatingCircuit(String),
    HeatingDemand(String),

    OutdoorTemperature,
    OutdoorTemperatureForecast4,
    OutdoorTemperatureForecast8,
    CloudCover,
    CloudCoverForecast4,
    CloudCoverForecast8,

    VentilationLevel,
    VentilationOutgoingTemperature,
    VentilationIncomingTemperature,
    VentilationFilterRuntime,

    HeatingPower,
    HeatingPumpSpeed,
    HeatingPipeOutTemperature,
    HeatingPipeInTemperature,

    Holiday,

    WindowContact(String),
    ShutterPosition(String),
}

impl Display for Item {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Item::Temperature(room) => write!(f, "Temperature_{room}"),
            Item::TargetTemperature(room) => write!(f, "Temperature_{room}_Target"),
            Item::ChargedBuffer(room) => write!(f, "Heating_{room}_Charged"),
            Item::HeatingCircuit(room) => write!(f, "Heating_{room}_Circuit"),
            Item::HeatingDemand(room) => write!(f, "Heating_{room}_Demand"),
            Item::OutdoorTemperature => write!(f, "Temperature_Garden"),
            Item::OutdoorTemperatureForecast4 => write!(f, "Temperature_Garden_Forecast4"),
            Item::OutdoorTemperatureForecast8 => write!(f, "Temperature_Garden_Forecast8"),
            Item::CloudCover => write!(f, "Cloud_Cover_Current"),
            Item::CloudCoverForecast4 => write!(f, "Cloud_Cover_Forecast4"),
            Item::CloudCoverForecast8 => write!(f, "Cloud_Cover_Forecast8"),
            Item::VentilationLevel => write!(f, "Ventilation_Fan_Level"),
            Item::VentilationOutgoingTemperature => write!(f, "Ventilation_Outgoing_Temperature"),
            Item::VentilationIncomingTemperature => write!(f, "Ventilation_Incoming_Temperature"),
            Item::VentilationFilterRuntime => write!(f, "Ventilation_Filter_Runtime"),
            Item::HeatingPower => write!(f, "Heating_Power"),
            Item::HeatingPumpSpeed => write!(f, "Heating_Circuit_Pump_Speed"),
            Item::HeatingPipeOutTemperature => write!(f, "Heating_Temperature_Pipe_Out"),
            Item::HeatingPipeInTemperature => write!(f, "Heating_Temperature_Pipe_In"),
            Item::Holiday => write!(f, "State_Holidays"),
            Item::WindowContact(id) => write!(f, "Window_{id}"),
            Item::ShutterPosition(id) => write!(f, "Shutter_{id}"),
        }
    }
}
