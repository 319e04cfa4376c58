/// Hardware constants for supported boards.
///
/// Each board module defines the logical pin names the firmware resolves,
/// selected at compile time via feature flags.

#[cfg(feature = "board-devkit")]
mod hw {
    /// BOOT button, active low with pull-up
    pub const BUTTON_PIN: &str = "GPIO0";
    /// On-board blue LED
    pub const STATUS_LED_PIN: &str = "D2";
    pub const BOARD_NAME: &str = "esp32_devkit_v1";
}

#[cfg(all(feature = "board-feather", not(feature = "board-devkit")))]
mod hw {
    pub const BUTTON_PIN: &str = "GPIO0";
    pub const STATUS_LED_PIN: &str = "D13";
    pub const BOARD_NAME: &str = "feather_esp32";
}

#[cfg(not(any(feature = "board-devkit", feature = "board-feather")))]
mod hw {
    pub const BUTTON_PIN: &str = "GPIO0";
    pub const STATUS_LED_PIN: &str = "D2";
    pub const BOARD_NAME: &str = "unknown";
}

pub use hw::*;

/// Prefix of the node's mDNS / access-point name
pub const HOSTNAME_PREFIX: &str = "proximity-";

/// Maximum hostname length: prefix + 6 bytes rendered as "xx-" groups
pub const HOSTNAME_LEN: usize = HOSTNAME_PREFIX.len() + 17;

/// Node hostname, e.g. "proximity-24-6f-28-aa-bb-cc"
pub type Hostname = heapless::String<HOSTNAME_LEN>;

/// Derive the node hostname from the station MAC address.
pub fn hostname(mac: &[u8; 6]) -> Hostname {
    use core::fmt::Write;
    let mut name = Hostname::new();
    let _ = write!(
        name,
        "{}{:02x}-{:02x}-{:02x}-{:02x}-{:02x}-{:02x}",
        HOSTNAME_PREFIX, mac[0], mac[1], mac[2], mac[3], mac[4], mac[5]
    );
    name
}

/// Resolve a logical pin name ("D2", "GPIO0", "13") to its GPIO number.
pub fn gpio_number(name: &str) -> Option<u8> {
    let digits = name
        .strip_prefix("GPIO")
        .or_else(|| name.strip_prefix('D'))
        .unwrap_or(name);
    let number: u8 = digits.parse().ok()?;
    (number < 40).then_some(number)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hostname_from_mac() {
        let name = hostname(&[0x24, 0x6F, 0x28, 0xAA, 0xBB, 0x0C]);
        assert_eq!(name.as_str(), "proximity-24-6f-28-aa-bb-0c");
    }

    #[test]
    fn gpio_number_accepts_board_and_gpio_names() {
        assert_eq!(gpio_number("D2"), Some(2));
        assert_eq!(gpio_number("GPIO0"), Some(0));
        assert_eq!(gpio_number("13"), Some(13));
        assert_eq!(gpio_number("D40"), None);
        assert_eq!(gpio_number("A0"), None);
    }
}
