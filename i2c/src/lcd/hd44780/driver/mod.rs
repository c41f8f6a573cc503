mod i2c;

use crate::I2cResult;
pub use i2c::*;
use std::fmt::Debug;
use std::time::Duration;

/// The `HD44780Driver` trait defines the command-level interface to an
/// HD44780 LCD controller, independent of the transport carrying the bytes.
///
/// Mode-changing commands take small flag value types ([FunctionSet],
/// [DisplayControl], [EntryMode]) instead of raw command bytes, so the flag
/// state a driver keeps in memory is always the exact byte last sent to the
/// controller.
pub trait HD44780Driver: Debug {
    /// Clears the display and sets the cursor to the home position.
    ///
    /// The controller needs about 2ms to execute this command.
    fn clear_display(&mut self) -> I2cResult<()> {
        self.send_command(0b00000001)
    }

    /// Sets the cursor to the home position.
    ///
    /// The controller needs about 2ms to execute this command.
    fn return_home(&mut self) -> I2cResult<()> {
        self.send_command(0b00000010)
    }

    /// Sets the entry mode: cursor direction and display auto-shift.
    fn set_entry_mode(&mut self, mode: EntryMode) -> I2cResult<()> {
        self.send_command(mode.to_command())
    }

    /// Sets the display on/off, cursor on/off, and blinking on/off.
    fn set_display_control(&mut self, control: DisplayControl) -> I2cResult<()> {
        self.send_command(control.to_command())
    }

    /// Moves the cursor or shifts the whole display, without changing DDRAM.
    fn cursor_shift(&mut self, display_shift: bool, direction: CursorDirection) -> I2cResult<()> {
        let mut command = 0b00010000;
        if display_shift {
            command |= 0b00001000;
        }
        if direction == CursorDirection::Right {
            command |= 0b00000100;
        }
        self.send_command(command)
    }

    /// Sets the function set: bus width, line count and font.
    fn function_set(&mut self, function: FunctionSet) -> I2cResult<()> {
        self.send_command(function.to_command())
    }

    /// Sets the CGRAM address (custom character memory).
    ///
    /// The address is masked to its 6 valid bits.
    fn set_cgram_address(&mut self, address: u8) -> I2cResult<()> {
        self.send_command(0b01000000 | (address & 0b00111111))
    }

    /// Sets the DDRAM address, which positions the cursor.
    ///
    /// The address is not validated; on real hardware an address past the end
    /// of a row lands in whatever DDRAM lies beyond it.
    fn set_ddram_address(&mut self, address: u8) -> I2cResult<()> {
        self.send_command(0b10000000 | address)
    }

    /// Stores a custom 5x8 character pattern in one of the 8 CGRAM slots.
    ///
    /// The location is masked to 0..=7. The pattern rows are written as data,
    /// top row first, with only the low 5 bits of each row visible.
    fn create_char(&mut self, location: u8, pattern: &[u8; 8]) -> I2cResult<()> {
        self.set_cgram_address((location & 0b111) << 3)?;
        for row in pattern {
            self.send_data(*row)?;
        }
        Ok(())
    }

    // Low-level commands
    // These raw commands are used by the high-level functions above.
    // They are implemented by the transport-specific driver.

    /// Sends a command byte to the HD44780 controller.
    /// Sets the RS line to 0 (command).
    fn send_command(&mut self, command: u8) -> I2cResult<()>;

    /// Sends a data byte to the HD44780 controller.
    /// Sets the RS line to 1 (data).
    fn send_data(&mut self, data: u8) -> I2cResult<()>;
}

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum CursorDirection {
    /// Moves the cursor to the left after writing data.
    Left,
    /// Moves the cursor to the right after writing data.
    Right,
}

/// Function set flags: bus width, line count and font.
///
/// Defaults to a 4-bit bus, one line, and the 5x8 font.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Default)]
pub struct FunctionSet {
    eight_bit: bool,
    two_lines: bool,
    tall_font: bool,
}

impl FunctionSet {
    /// Selects the 8-bit (`true`) or 4-bit (`false`) bus width.
    pub const fn eight_bit(self, on: bool) -> Self {
        Self { eight_bit: on, ..self }
    }

    /// Selects two display lines instead of one.
    pub const fn two_lines(self, on: bool) -> Self {
        Self { two_lines: on, ..self }
    }

    /// Selects the 5x10 font. Only meaningful on single-line displays.
    pub const fn tall_font(self, on: bool) -> Self {
        Self { tall_font: on, ..self }
    }

    /// Builds the function set command byte.
    pub const fn to_command(self) -> u8 {
        let mut command = 0b00100000;
        if self.eight_bit {
            command |= 0b00010000;
        }
        if self.two_lines {
            command |= 0b00001000;
        }
        if self.tall_font {
            command |= 0b00000100;
        }
        command
    }
}

/// Display control flags: display, cursor and cursor blink.
///
/// Defaults to everything off.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Default)]
pub struct DisplayControl {
    display_on: bool,
    cursor_on: bool,
    blink_on: bool,
}

impl DisplayControl {
    /// Turns the whole display on or off. DDRAM contents are kept.
    pub const fn display(self, on: bool) -> Self {
        Self { display_on: on, ..self }
    }

    /// Shows or hides the underline cursor.
    pub const fn cursor(self, on: bool) -> Self {
        Self { cursor_on: on, ..self }
    }

    /// Enables or disables blinking of the cursor cell.
    pub const fn blink(self, on: bool) -> Self {
        Self { blink_on: on, ..self }
    }

    /// Builds the display control command byte.
    pub const fn to_command(self) -> u8 {
        let mut command = 0b00001000;
        if self.display_on {
            command |= 0b00000100;
        }
        if self.cursor_on {
            command |= 0b00000010;
        }
        if self.blink_on {
            command |= 0b00000001;
        }
        command
    }
}

/// Entry mode flags: cursor direction and display auto-shift.
///
/// Defaults to left-to-right text with no auto-shift, the usual setting for
/// roman scripts.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct EntryMode {
    direction: CursorDirection,
    autoscroll: bool,
}

impl Default for EntryMode {
    fn default() -> Self {
        EntryMode {
            direction: CursorDirection::Right,
            autoscroll: false,
        }
    }
}

impl EntryMode {
    /// Sets the direction the cursor moves after each written character.
    pub const fn direction(self, direction: CursorDirection) -> Self {
        Self { direction, ..self }
    }

    /// Enables or disables shifting the display on each written character.
    pub const fn autoscroll(self, on: bool) -> Self {
        Self { autoscroll: on, ..self }
    }

    /// Builds the entry mode command byte.
    pub const fn to_command(self) -> u8 {
        let mut command = 0b00000100;
        if matches!(self.direction, CursorDirection::Right) {
            command |= 0b00000010;
        }
        if self.autoscroll {
            command |= 0b00000001;
        }
        command
    }
}

/// Per-row DDRAM base addresses for displays of up to 4 rows.
pub const ROW_OFFSETS: [u8; 4] = [0x00, 0x40, 0x14, 0x54];

/// Maps a (column, row) pair to a DDRAM address.
///
/// A row exceeding the configured row count is clamped to the last configured
/// row. The column is never validated; a column past the end of a row wraps
/// into whatever DDRAM lies beyond it, exactly as the bare controller
/// behaves.
pub fn ddram_address(col: u8, row: u8, rows: u8) -> u8 {
    let row = if row > rows { rows.saturating_sub(1) } else { row };
    let offset = ROW_OFFSETS[usize::from(row).min(ROW_OFFSETS.len() - 1)];
    col.wrapping_add(offset)
}

/// One step of the power-on initialization sequence.
///
/// The sequence is plain data so its exact order and timing can be inspected
/// independently of the transport executing it.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum InitStep {
    /// Blocking settle delay.
    Settle(Duration),
    /// Raw port write with every data and control line low, leaving only the
    /// configured backlight state asserted.
    Reset,
    /// A single latched nibble, already shifted into the high data bits.
    Nibble(u8),
    /// A full command byte, framed by the transport as two nibbles.
    Command(u8),
}

/// Builds the fixed power-on initialization sequence for the given session
/// configuration.
///
/// The order follows the HD44780 datasheet (figure 24): the switch to 4-bit
/// mode is attempted three times with decreasing settle delays, in case the
/// controller is caught mid-reset, before the final mode nibble and the
/// configuration commands. The steps must be executed in order, and the
/// settle delays are datasheet minimums.
pub fn init_sequence(
    function: FunctionSet,
    control: DisplayControl,
    entry_mode: EntryMode,
) -> [InitStep; 17] {
    use InitStep::*;
    [
        // Datasheet wants at least 40ms after power rises above 2.7V.
        Settle(Duration::from_millis(50)),
        // Pull RS and R/W low to begin commands.
        Reset,
        Settle(Duration::from_secs(1)),
        Nibble(0x03 << 4),
        Settle(Duration::from_micros(4500)), // wait min 4.1ms
        Nibble(0x03 << 4),
        Settle(Duration::from_micros(4500)), // wait min 4.1ms
        Nibble(0x03 << 4),
        Settle(Duration::from_micros(150)),
        // Finally, set the 4-bit interface.
        Nibble(0x02 << 4),
        Command(function.to_command()),
        Command(control.to_command()),
        // Clearing takes the controller about 2ms.
        Command(0b00000001),
        Settle(Duration::from_micros(2000)),
        Command(entry_mode.to_command()),
        // As does returning home.
        Command(0b00000010),
        Settle(Duration::from_micros(2000)),
    ]
}
