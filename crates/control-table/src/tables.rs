use crate::{Category, ControlTable, ParamDescriptor, StatusRegisters, UnknownParam};

/// Names starting with this prefix address the indirect-mapping area.
pub const INDIRECT_PREFIX: &str = "indirect_";

type Entries = &'static [(&'static str, &'static str)];

struct TableDef {
    info: Entries,
    config: Entries,
    control: Entries,
    status: &'static [&'static str],
    status_registers: StatusRegisters,
}

const X_SERIES: TableDef = TableDef {
    info: &[
        ("model_number", "Model number of the device"),
        ("model_information", "Additional model information"),
        ("firmware_version", "Firmware version"),
    ],
    config: &[
        ("id", "Bus address of the device"),
        ("baud_rate", "Serial baud rate index"),
        ("return_delay_time", "Delay before the status packet, 2 us per unit"),
        ("drive_mode", "Direction and profile configuration bits"),
        ("operating_mode", "Control mode (current, velocity, position, ...)"),
        ("secondary_id", "Group address shared by several devices"),
        ("protocol_type", "Communication protocol version"),
        ("homing_offset", "Offset added to the present position"),
        ("moving_threshold", "Velocity above which the device is considered moving"),
        ("temperature_limit", "Internal temperature limit in degrees Celsius"),
        ("max_voltage_limit", "Maximum operating voltage"),
        ("min_voltage_limit", "Minimum operating voltage"),
        ("pwm_limit", "Maximum PWM output"),
        ("current_limit", "Maximum current output"),
        ("acceleration_limit", "Maximum profile acceleration"),
        ("velocity_limit", "Maximum goal velocity"),
        ("max_position_limit", "Upper bound of the goal position"),
        ("min_position_limit", "Lower bound of the goal position"),
        ("startup_configuration", "Behaviour applied at power-on"),
        ("shutdown", "Hardware error bits that shut the device down"),
    ],
    control: &[
        ("torque_enable", "Enable or disable output torque"),
        ("led", "Status LED on or off"),
        ("status_return_level", "Which instructions return a status packet"),
        ("velocity_i_gain", "Velocity loop integral gain"),
        ("velocity_p_gain", "Velocity loop proportional gain"),
        ("position_d_gain", "Position loop derivative gain"),
        ("position_i_gain", "Position loop integral gain"),
        ("position_p_gain", "Position loop proportional gain"),
        ("feedforward_2nd_gain", "Acceleration feedforward gain"),
        ("feedforward_1st_gain", "Velocity feedforward gain"),
        ("bus_watchdog", "Communication watchdog period, 20 ms per unit"),
        ("goal_pwm", "Target PWM in PWM control mode"),
        ("goal_current", "Target current in current control mode"),
        ("goal_velocity", "Target velocity in velocity control mode"),
        ("profile_acceleration", "Acceleration of the motion profile"),
        ("profile_velocity", "Maximum velocity of the motion profile"),
        ("goal_position", "Target position"),
    ],
    status: &[
        "hardware_error_status",
        "registered_instruction",
        "realtime_tick",
        "moving",
        "moving_status",
        "present_pwm",
        "present_current",
        "present_velocity",
        "present_position",
        "velocity_trajectory",
        "position_trajectory",
        "present_input_voltage",
        "present_temperature",
        "backup_ready",
    ],
    status_registers: StatusRegisters {
        temperature: "present_temperature",
        voltage: "present_input_voltage",
        current: Some("present_current"),
        hardware_error: "hardware_error_status",
    },
};

const XL320: TableDef = TableDef {
    info: &[
        ("model_number", "Model number of the device"),
        ("firmware_version", "Firmware version"),
    ],
    config: &[
        ("id", "Bus address of the device"),
        ("baud_rate", "Serial baud rate index"),
        ("return_delay_time", "Delay before the status packet, 2 us per unit"),
        ("cw_angle_limit", "Clockwise angle limit"),
        ("ccw_angle_limit", "Counter-clockwise angle limit"),
        ("control_mode", "Wheel or joint mode"),
        ("temperature_limit", "Internal temperature limit in degrees Celsius"),
        ("min_voltage_limit", "Minimum operating voltage"),
        ("max_voltage_limit", "Maximum operating voltage"),
        ("max_torque", "Maximum torque at power-on"),
        ("status_return_level", "Which instructions return a status packet"),
        ("shutdown", "Hardware error bits that shut the device down"),
    ],
    control: &[
        ("torque_enable", "Enable or disable output torque"),
        ("led", "LED colour"),
        ("d_gain", "Position loop derivative gain"),
        ("i_gain", "Position loop integral gain"),
        ("p_gain", "Position loop proportional gain"),
        ("goal_position", "Target position"),
        ("moving_speed", "Target speed"),
        ("torque_limit", "Runtime torque limit"),
        ("punch", "Minimum current applied to the motor"),
    ],
    status: &[
        "present_position",
        "present_speed",
        "present_load",
        "present_voltage",
        "present_temperature",
        "registered_instruction",
        "moving",
        "hardware_error_status",
    ],
    status_registers: StatusRegisters {
        temperature: "present_temperature",
        voltage: "present_voltage",
        current: None,
        hardware_error: "hardware_error_status",
    },
};

fn table(t: ControlTable) -> &'static TableDef {
    match t {
        ControlTable::XSeries => &X_SERIES,
        ControlTable::Xl320 => &XL320,
    }
}

fn categorized(def: &TableDef) -> impl Iterator<Item = (Category, &'static str, &'static str)> {
    let tag = |c: Category, entries: Entries| entries.iter().map(move |&(n, d)| (c, n, d));
    tag(Category::Info, def.info)
        .chain(tag(Category::Config, def.config))
        .chain(tag(Category::Control, def.control))
}

/// Status and indirect-addressing names belong to no category.
pub fn is_excluded(t: ControlTable, name: &str) -> bool {
    name.starts_with(INDIRECT_PREFIX) || table(t).status.contains(&name)
}

pub fn param_info(t: ControlTable, name: &str) -> Result<ParamDescriptor, UnknownParam> {
    let unknown = || UnknownParam {
        table: t,
        name: name.to_string(),
    };
    if is_excluded(t, name) {
        return Err(unknown());
    }
    categorized(table(t))
        .find(|&(_, n, _)| n == name)
        .map(|(category, n, doc)| ParamDescriptor::new(n, category, doc))
        .ok_or_else(unknown)
}

pub fn is_writable(t: ControlTable, name: &str) -> bool {
    param_info(t, name).map(|d| d.writable).unwrap_or(false)
}

pub fn requires_torque_off(t: ControlTable, name: &str) -> bool {
    param_info(t, name)
        .map(|d| d.requires_torque_off)
        .unwrap_or(false)
}

/// Every categorized register name, info first, then config, then control.
pub fn list_params(t: ControlTable) -> Vec<&'static str> {
    categorized(table(t)).map(|(_, n, _)| n).collect()
}

pub fn status_registers(t: ControlTable) -> StatusRegisters {
    table(t).status_registers
}
