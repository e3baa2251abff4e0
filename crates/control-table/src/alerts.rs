use serde::{Deserialize, Serialize};

/// Named bits of the hardware error status register.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HardwareAlert {
    InputVoltage,
    Overheating,
    Encoder,
    ElectricalShock,
    Overload,
}

impl HardwareAlert {
    pub const ALL: [HardwareAlert; 5] = [
        HardwareAlert::InputVoltage,
        HardwareAlert::Overheating,
        HardwareAlert::Encoder,
        HardwareAlert::ElectricalShock,
        HardwareAlert::Overload,
    ];

    pub fn bit(self) -> u8 {
        match self {
            HardwareAlert::InputVoltage => 0,
            HardwareAlert::Overheating => 2,
            HardwareAlert::Encoder => 3,
            HardwareAlert::ElectricalShock => 4,
            HardwareAlert::Overload => 5,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            HardwareAlert::InputVoltage => "input_voltage",
            HardwareAlert::Overheating => "overheating",
            HardwareAlert::Encoder => "encoder",
            HardwareAlert::ElectricalShock => "electrical_shock",
            HardwareAlert::Overload => "overload",
        }
    }

    /// Alerts set in `bitmask`; unassigned bits are ignored.
    pub fn decode(bitmask: u8) -> Vec<HardwareAlert> {
        Self::ALL
            .into_iter()
            .filter(|a| bitmask & (1 << a.bit()) != 0)
            .collect()
    }
}
