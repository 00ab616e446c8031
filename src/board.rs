/// Hardware constants for supported boards.
///
/// Each board module defines the DAC routing and supply rail selected at
/// compile time via feature flags.

#[cfg(feature = "board-devkitc")]
mod hw {
    pub const HAS_DAC: bool = true;
    pub const SUPPLY_MV: u16 = 3300; // VDD 3.3V
    pub const BOARD_NAME: &str = "esp32_devkitc";
}

#[cfg(not(feature = "board-devkitc"))]
mod hw {
    pub const HAS_DAC: bool = false;
    pub const SUPPLY_MV: u16 = 3300;
    pub const BOARD_NAME: &str = "unknown";
}

pub use hw::*;

/// DAC output channel driving the buzzer.
#[cfg(not(feature = "dac-channel-2"))]
pub const DAC_CHANNEL: u8 = 1;
#[cfg(feature = "dac-channel-2")]
pub const DAC_CHANNEL: u8 = 2;

/// GPIO wired to `DAC_CHANNEL` on the ESP32.
pub const DAC_GPIO: u8 = dac_gpio(DAC_CHANNEL);

/// ESP32 pad of a DAC channel: channel 1 is GPIO25, channel 2 is GPIO26.
pub const fn dac_gpio(channel: u8) -> u8 {
    if channel == 2 {
        26
    } else {
        25
    }
}
