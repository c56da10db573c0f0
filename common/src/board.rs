/// Hardware the event loop samples and drives.
pub trait Board {
    /// Raw electrical level of the button input (`true` = high).
    fn button_level(&mut self) -> bool;

    fn set_indicator(&mut self, on: bool);

    /// Raw ADC code from the temperature channel.
    fn temperature_raw(&mut self) -> u16;

    /// Monotonic milliseconds since boot.
    fn now_ms(&self) -> u64;
}
