use crate::lcd::hd44780::driver::{
    CursorDirection, DisplayControl, EntryMode, FunctionSet, HD44780Driver, InitStep,
    ddram_address, init_sequence,
};
use crate::{I2cError, I2cResult, SharedI2cBus};
use log::{debug, trace};
use std::thread::sleep;
use std::time::Duration;

// PCF8574 backpack line assignments. R/W is tied low by never setting bit 1.
const EN: u8 = 0b00000100; // Enable bit
const RS: u8 = 0b00000001; // Register select bit
const BACKLIGHT: u8 = 0b00001000;

/// HD44780 driver talking through an I2C parallel port expander (the common
/// PCF8574 "backpack" boards).
///
/// The expander drives the controller's 4-bit data bus plus the RS and E
/// control lines, so every byte reaches the display as two nibble transfers,
/// each latched by an enable pulse. The backlight is wired to a spare
/// expander line and gets re-asserted on every transmitted byte.
///
/// The bus is borrowed for the driver's lifetime and may be shared with other
/// peripherals; the lock is taken per single-byte transaction only.
#[derive(Debug)]
pub struct I2cHD44780Driver<'a> {
    bus: &'a SharedI2cBus<'a>,
    address: u8,
    cols: u8,
    rows: u8,
    backlight: bool,
    function: FunctionSet,
    control: DisplayControl,
    entry_mode: EntryMode,
}

impl<'a> I2cHD44780Driver<'a> {
    /// Address of PCF8574 backpacks with no address jumpers bridged.
    pub const DEFAULT_ADDRESS: u8 = 0x27;
    /// Alternate address seen on some boards.
    // TODO: verify the alternate address against real hardware
    pub const ALTERNATE_ADDRESS: u8 = 0x30;

    /// Creates a driver on the given shared bus, using [Self::DEFAULT_ADDRESS]
    /// until [Self::begin] overrides it.
    pub fn new(bus: &'a SharedI2cBus<'a>) -> Self {
        I2cHD44780Driver {
            bus,
            address: Self::DEFAULT_ADDRESS,
            cols: 0,
            rows: 0,
            backlight: true,
            function: FunctionSet::default(),
            control: DisplayControl::default(),
            entry_mode: EntryMode::default(),
        }
    }

    /// Configured column count. Zero until [Self::begin] runs.
    pub fn cols(&self) -> u8 {
        self.cols
    }

    /// Configured row count. Zero until [Self::begin] runs.
    pub fn rows(&self) -> u8 {
        self.rows
    }

    fn backlight_mask(&self) -> u8 {
        if self.backlight { BACKLIGHT } else { 0 }
    }

    /// Writes one byte to the expander, merged with the backlight bit.
    ///
    /// The bus lock is held for just this one transaction, so other
    /// peripherals on the wire can interleave their own transfers.
    fn expander_write(&self, data: u8) -> I2cResult<()> {
        let byte = data | self.backlight_mask();
        let mut bus = self.bus.lock().map_err(|_| I2cError::Poisoned)?;
        bus.write(self.address, &[byte])
    }

    /// Latches the data lines into the controller.
    fn pulse_enable(&self, data: u8) -> I2cResult<()> {
        self.expander_write(data | EN)?;
        sleep(Duration::from_micros(1)); // enable pulse must be > 450ns

        self.expander_write(data & !EN)?;
        sleep(Duration::from_micros(50)); // commands need > 37us to settle
        Ok(())
    }

    fn write_4_bits(&self, value: u8) -> I2cResult<()> {
        self.expander_write(value)?;
        self.pulse_enable(value)
    }

    fn send(&self, value: u8, mode: u8) -> I2cResult<()> {
        trace!("Sending byte: {:08b}, RS: {}", value, mode & RS);

        let high_nibble = value & 0xf0;
        let low_nibble = (value << 4) & 0xf0;

        self.write_4_bits(high_nibble | mode)?;
        self.write_4_bits(low_nibble | mode)
    }

    /// Runs the one-shot power-on initialization sequence and stores the
    /// session configuration.
    ///
    /// The sequence is strictly ordered and never retried; see
    /// [init_sequence] for the steps and their datasheet-mandated delays.
    /// Must complete before any other operation is used.
    pub fn begin(&mut self, address: u8, cols: u8, rows: u8) -> I2cResult<()> {
        self.address = address;
        self.cols = cols;
        self.rows = rows;
        self.backlight = true;
        self.function = FunctionSet::default().two_lines(rows > 1);
        self.control = DisplayControl::default().display(true);
        self.entry_mode = EntryMode::default();

        debug!("Initializing LCD at {:#04x} ({}x{})", address, cols, rows);

        for step in init_sequence(self.function, self.control, self.entry_mode) {
            match step {
                InitStep::Settle(delay) => sleep(delay),
                InitStep::Reset => self.expander_write(0)?,
                InitStep::Nibble(nibble) => self.write_4_bits(nibble)?,
                InitStep::Command(command) => self.send_command(command)?,
            }
        }
        Ok(())
    }

    /// Checks whether the device acknowledges its address.
    ///
    /// Writes a single idle byte (backlight state only, no enable pulse, so
    /// nothing is latched) and reports the acknowledgement. This is the one
    /// place a bus failure is interpreted rather than propagated.
    pub fn is_connected(&self) -> bool {
        self.expander_write(0).is_ok()
    }

    /// Clears the display and homes the cursor.
    pub fn clear(&mut self) -> I2cResult<()> {
        self.clear_display()?;
        sleep(Duration::from_micros(2000)); // this command takes a long time!
        Ok(())
    }

    /// Returns the cursor to (0, 0) and undoes any display shift.
    pub fn home(&mut self) -> I2cResult<()> {
        self.return_home()?;
        sleep(Duration::from_micros(2000)); // this command takes a long time!
        Ok(())
    }

    /// Turns the display on.
    pub fn display(&mut self) -> I2cResult<()> {
        self.control = self.control.display(true);
        self.set_display_control(self.control)
    }

    /// Turns the display off. DDRAM contents are kept.
    pub fn no_display(&mut self) -> I2cResult<()> {
        self.control = self.control.display(false);
        self.set_display_control(self.control)
    }

    /// Shows the underline cursor.
    pub fn cursor(&mut self) -> I2cResult<()> {
        self.control = self.control.cursor(true);
        self.set_display_control(self.control)
    }

    /// Hides the underline cursor.
    pub fn no_cursor(&mut self) -> I2cResult<()> {
        self.control = self.control.cursor(false);
        self.set_display_control(self.control)
    }

    /// Makes the cursor cell blink.
    pub fn blink(&mut self) -> I2cResult<()> {
        self.control = self.control.blink(true);
        self.set_display_control(self.control)
    }

    /// Stops the cursor cell blinking.
    pub fn no_blink(&mut self) -> I2cResult<()> {
        self.control = self.control.blink(false);
        self.set_display_control(self.control)
    }

    /// Scrolls the whole display one cell to the left without changing DDRAM.
    pub fn scroll_display_left(&mut self) -> I2cResult<()> {
        self.cursor_shift(true, CursorDirection::Left)
    }

    /// Scrolls the whole display one cell to the right without changing DDRAM.
    pub fn scroll_display_right(&mut self) -> I2cResult<()> {
        self.cursor_shift(true, CursorDirection::Right)
    }

    /// Makes text flow left to right.
    pub fn left_to_right(&mut self) -> I2cResult<()> {
        self.entry_mode = self.entry_mode.direction(CursorDirection::Right);
        self.set_entry_mode(self.entry_mode)
    }

    /// Makes text flow right to left.
    pub fn right_to_left(&mut self) -> I2cResult<()> {
        self.entry_mode = self.entry_mode.direction(CursorDirection::Left);
        self.set_entry_mode(self.entry_mode)
    }

    /// Shifts the display on every written character, right-justifying text
    /// from the cursor.
    pub fn autoscroll(&mut self) -> I2cResult<()> {
        self.entry_mode = self.entry_mode.autoscroll(true);
        self.set_entry_mode(self.entry_mode)
    }

    /// Stops shifting the display on written characters.
    pub fn no_autoscroll(&mut self) -> I2cResult<()> {
        self.entry_mode = self.entry_mode.autoscroll(false);
        self.set_entry_mode(self.entry_mode)
    }

    /// Turns the backlight on.
    pub fn backlight(&mut self) -> I2cResult<()> {
        self.backlight = true;
        self.expander_write(0)
    }

    /// Turns the backlight off.
    pub fn no_backlight(&mut self) -> I2cResult<()> {
        self.backlight = false;
        self.expander_write(0)
    }

    /// Moves the cursor to the given column and row.
    ///
    /// A row past the configured row count is clamped to the last row; the
    /// column is deliberately not validated (see [ddram_address]).
    pub fn set_cursor(&mut self, col: u8, row: u8) -> I2cResult<()> {
        let address = ddram_address(col, row, self.rows);
        self.set_ddram_address(address)
    }

    /// Writes a run of characters at the cursor, returning the count written.
    ///
    /// Bytes pass straight through to the controller: no wrapping, no cursor
    /// advance across rows, and non-ASCII UTF-8 bytes land on whatever the
    /// character ROM maps them to.
    pub fn print(&mut self, text: &str) -> I2cResult<usize> {
        let mut written = 0;
        for byte in text.bytes() {
            self.send_data(byte)?;
            written += 1;
        }
        Ok(written)
    }
}

impl HD44780Driver for I2cHD44780Driver<'_> {
    fn send_command(&mut self, command: u8) -> I2cResult<()> {
        self.send(command, 0)
    }

    fn send_data(&mut self, data: u8) -> I2cResult<()> {
        self.send(data, RS)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::I2cBus;
    use std::sync::Mutex;

    #[derive(Debug, Default)]
    struct MockBus {
        writes: Vec<(u8, u8)>,
        fail: bool,
    }

    impl I2cBus for MockBus {
        fn write(&mut self, address: u8, bytes: &[u8]) -> I2cResult<()> {
            if self.fail {
                return Err(I2cError::Io(std::io::ErrorKind::Other));
            }
            for byte in bytes {
                self.writes.push((address, *byte));
            }
            Ok(())
        }
    }

    /// Recovers the latched nibbles from the raw write stream: a nibble is
    /// latched on each enable falling edge.
    fn latched(writes: &[(u8, u8)]) -> Vec<(u8, bool)> {
        let mut nibbles = Vec::new();
        for pair in writes.windows(2) {
            let before = pair[0].1;
            let after = pair[1].1;
            if before & EN != 0 && after & EN == 0 {
                nibbles.push((after & 0xf0, after & RS != 0));
            }
        }
        nibbles
    }

    /// Reassembles latched nibbles into full bytes, high nibble first.
    fn latched_bytes(writes: &[(u8, u8)]) -> Vec<(u8, bool)> {
        latched(writes)
            .chunks(2)
            .map(|pair| (pair[0].0 | (pair[1].0 >> 4), pair[0].1))
            .collect()
    }

    #[test]
    fn command_splits_into_two_pulsed_nibbles() {
        let bus = Mutex::new(MockBus::default());
        let mut lcd = I2cHD44780Driver::new(&bus);
        lcd.send_command(0xab).unwrap();

        let bus = bus.lock().unwrap();
        // Three expander writes per nibble: set, enable high, enable low.
        assert_eq!(bus.writes.len(), 6);
        // High nibble goes out first.
        assert_eq!(bus.writes[0].1 & 0xf0, 0xa0);
        assert_eq!(bus.writes[3].1 & 0xf0, 0xb0);
        // Commands keep RS low on every write.
        assert!(bus.writes.iter().all(|(_, byte)| byte & RS == 0));
        // Everything goes to the default address.
        assert!(bus.writes.iter().all(|(address, _)| *address == 0x27));

        assert_eq!(latched(&bus.writes), [(0xa0, false), (0xb0, false)]);
    }

    #[test]
    fn data_carries_register_select() {
        let bus = Mutex::new(MockBus::default());
        let mut lcd = I2cHD44780Driver::new(&bus);
        lcd.send_data(b'A').unwrap();

        let bus = bus.lock().unwrap();
        assert!(bus.writes.iter().all(|(_, byte)| byte & RS != 0));
        assert_eq!(latched_bytes(&bus.writes), [(b'A', true)]);
    }

    #[test]
    fn enable_pulses_high_then_low_per_nibble() {
        let bus = Mutex::new(MockBus::default());
        let mut lcd = I2cHD44780Driver::new(&bus);
        lcd.send_command(0x5a).unwrap();

        let bus = bus.lock().unwrap();
        for nibble in bus.writes.chunks(3) {
            assert_eq!(nibble[0].1 & EN, 0);
            assert_ne!(nibble[1].1 & EN, 0);
            assert_eq!(nibble[2].1 & EN, 0);
            // The data bits stay stable across the pulse.
            assert_eq!(nibble[0].1 & 0xf0, nibble[1].1 & 0xf0);
            assert_eq!(nibble[1].1 & 0xf0, nibble[2].1 & 0xf0);
        }
    }

    #[test]
    fn control_toggles_resend_the_full_flag_byte() {
        let bus = Mutex::new(MockBus::default());
        let mut lcd = I2cHD44780Driver::new(&bus);

        lcd.cursor().unwrap();
        lcd.blink().unwrap();
        lcd.no_cursor().unwrap();
        lcd.no_blink().unwrap();

        let bus = bus.lock().unwrap();
        let commands: Vec<u8> = latched_bytes(&bus.writes)
            .into_iter()
            .map(|(byte, _)| byte)
            .collect();
        assert_eq!(
            commands,
            [0b00001010, 0b00001011, 0b00001001, 0b00001000]
        );
        // On-then-off restores the original flag byte.
        assert_eq!(commands[3], DisplayControl::default().to_command());
    }

    #[test]
    fn entry_mode_toggles_round_trip() {
        let bus = Mutex::new(MockBus::default());
        let mut lcd = I2cHD44780Driver::new(&bus);

        lcd.right_to_left().unwrap();
        lcd.left_to_right().unwrap();
        lcd.autoscroll().unwrap();
        lcd.no_autoscroll().unwrap();

        let bus = bus.lock().unwrap();
        let commands: Vec<u8> = latched_bytes(&bus.writes)
            .into_iter()
            .map(|(byte, _)| byte)
            .collect();
        assert_eq!(
            commands,
            [0b00000100, 0b00000110, 0b00000111, 0b00000110]
        );
        assert_eq!(commands[3], EntryMode::default().to_command());
    }

    #[test]
    fn begin_syncs_to_4bit_mode_before_configuring() {
        let bus = Mutex::new(MockBus::default());
        let mut lcd = I2cHD44780Driver::new(&bus);
        lcd.begin(0x27, 16, 2).unwrap();

        let bus = bus.lock().unwrap();
        // The very first write resets the expander with backlight asserted.
        assert_eq!(bus.writes[0].1, BACKLIGHT);

        let nibbles = latched(&bus.writes);
        // The 8-bit sync nibble exactly three times, then the 4-bit switch.
        assert_eq!(
            &nibbles[..4],
            [(0x30, false), (0x30, false), (0x30, false), (0x20, false)]
        );

        // The configuration commands follow, in strict order.
        let commands: Vec<u8> = nibbles[4..]
            .chunks(2)
            .map(|pair| pair[0].0 | (pair[1].0 >> 4))
            .collect();
        assert_eq!(
            commands,
            [
                0b00101000, // function set: 4-bit, two lines, 5x8 font
                0b00001100, // display on, no cursor, no blink
                0b00000001, // clear
                0b00000110, // entry mode: left-to-right, no shift
                0b00000010, // home
            ]
        );
    }

    #[test]
    fn backlight_bit_rides_on_every_write() {
        let bus = Mutex::new(MockBus::default());
        let mut lcd = I2cHD44780Driver::new(&bus);

        lcd.send_command(0x01).unwrap();
        let lit = bus.lock().unwrap().writes.len();

        lcd.no_backlight().unwrap();
        lcd.send_command(0x01).unwrap();
        lcd.send_data(b'x').unwrap();
        let dark = bus.lock().unwrap().writes.len();

        lcd.backlight().unwrap();
        lcd.send_data(b'y').unwrap();

        let bus = bus.lock().unwrap();
        assert!(bus.writes[..lit].iter().all(|(_, b)| b & BACKLIGHT != 0));
        assert!(bus.writes[lit..dark].iter().all(|(_, b)| b & BACKLIGHT == 0));
        assert!(bus.writes[dark..].iter().all(|(_, b)| b & BACKLIGHT != 0));
    }

    #[test]
    fn set_cursor_addresses_ddram() {
        let bus = Mutex::new(MockBus::default());
        let mut lcd = I2cHD44780Driver::new(&bus);
        lcd.rows = 2;

        lcd.set_cursor(3, 1).unwrap();
        // Out-of-range row clamps to the last configured row.
        lcd.set_cursor(0, 9).unwrap();

        let bus = bus.lock().unwrap();
        let commands: Vec<u8> = latched_bytes(&bus.writes)
            .into_iter()
            .map(|(byte, _)| byte)
            .collect();
        assert_eq!(commands, [0x80 | 0x43, 0x80 | 0x40]);
    }

    #[test]
    fn print_passes_bytes_through_and_counts_them() {
        let bus = Mutex::new(MockBus::default());
        let mut lcd = I2cHD44780Driver::new(&bus);

        assert_eq!(lcd.print("Hi!").unwrap(), 3);

        let bus = bus.lock().unwrap();
        assert_eq!(
            latched_bytes(&bus.writes),
            [(b'H', true), (b'i', true), (b'!', true)]
        );
    }

    #[test]
    fn create_char_fills_one_cgram_slot() {
        let bus = Mutex::new(MockBus::default());
        let mut lcd = I2cHD44780Driver::new(&bus);

        let pattern = [0b00100, 0b01110, 0b10101, 0b00100, 0b00100, 0b00100, 0b00100, 0b00000];
        lcd.create_char(2, &pattern).unwrap();

        let bus = bus.lock().unwrap();
        let bytes = latched_bytes(&bus.writes);
        assert_eq!(bytes[0], (0b01000000 | (2 << 3), false));
        for (i, row) in pattern.iter().enumerate() {
            assert_eq!(bytes[i + 1], (*row, true));
        }
    }

    #[test]
    fn scroll_commands_are_stateless() {
        let bus = Mutex::new(MockBus::default());
        let mut lcd = I2cHD44780Driver::new(&bus);

        lcd.scroll_display_left().unwrap();
        lcd.scroll_display_right().unwrap();

        let bus = bus.lock().unwrap();
        let commands: Vec<u8> = latched_bytes(&bus.writes)
            .into_iter()
            .map(|(byte, _)| byte)
            .collect();
        assert_eq!(commands, [0b00011000, 0b00011100]);
    }

    #[test]
    fn is_connected_reflects_the_acknowledgement() {
        let bus = Mutex::new(MockBus::default());
        let lcd = I2cHD44780Driver::new(&bus);
        assert!(lcd.is_connected());

        let failing = Mutex::new(MockBus {
            fail: true,
            ..MockBus::default()
        });
        let lcd = I2cHD44780Driver::new(&failing);
        assert!(!lcd.is_connected());
    }

    #[test]
    fn probe_does_not_latch_anything() {
        let bus = Mutex::new(MockBus::default());
        let lcd = I2cHD44780Driver::new(&bus);
        lcd.is_connected();

        let bus = bus.lock().unwrap();
        assert_eq!(bus.writes.len(), 1);
        assert_eq!(bus.writes[0].1 & EN, 0);
    }
}
