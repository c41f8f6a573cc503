use charlcd_i2c::dev::DevI2cBus;
use charlcd_i2c::lcd::hd44780::driver::{HD44780Driver, I2cHD44780Driver};
use dotenv::dotenv;
use log::{debug, info, warn};
use std::env::var;
use std::sync::Mutex;
use std::thread::sleep;
use std::time::Duration;
use sysinfo::System;

// 5x8 heart pattern for the custom character demo.
const HEART: [u8; 8] = [
    0b00000, 0b01010, 0b11111, 0b11111, 0b01110, 0b00100, 0b00000, 0b00000,
];

fn parse_address(text: &str) -> eyre::Result<u8> {
    let text = text.trim();
    Ok(match text.strip_prefix("0x") {
        Some(hex) => u8::from_str_radix(hex, 16)?,
        None => text.parse()?,
    })
}

fn main() -> eyre::Result<()> {
    dotenv().ok();
    pretty_env_logger::init();

    const UNKNOWN_STR: &str = "???";

    info!(
        "Hello, {}!",
        System::name().as_deref().unwrap_or(UNKNOWN_STR)
    );
    info!(
        "System ver {} kernel ver {}",
        System::long_os_version().as_deref().unwrap_or(UNKNOWN_STR),
        System::kernel_version().as_deref().unwrap_or(UNKNOWN_STR),
    );

    let adapter: u8 = match var("CHARLCD_I2C_BUS") {
        Ok(text) => text.trim().parse()?,
        Err(_) => 1,
    };
    let address = match var("CHARLCD_I2C_ADDRESS") {
        Ok(text) => parse_address(&text)?,
        Err(_) => I2cHD44780Driver::DEFAULT_ADDRESS,
    };
    let cols: u8 = match var("CHARLCD_COLS") {
        Ok(text) => text.trim().parse()?,
        Err(_) => 16,
    };
    let rows: u8 = match var("CHARLCD_ROWS") {
        Ok(text) => text.trim().parse()?,
        Err(_) => 2,
    };

    info!(
        "LCD @ /dev/i2c-{}, address {:#04x}, {}x{}",
        adapter, address, cols, rows
    );

    debug!("Opening I2C adapter...");
    let bus = Mutex::new(DevI2cBus::new_adapter(adapter)?);

    debug!("Initializing LCD driver...");
    let mut lcd = I2cHD44780Driver::new(&bus);
    lcd.begin(address, cols, rows)?;

    if !lcd.is_connected() {
        warn!(
            "LCD at {:#04x} stopped acknowledging; check the wiring",
            address
        );
    }

    lcd.print("charlcd ready")?;
    lcd.set_cursor(0, 1)?;
    let hostname = System::host_name().unwrap_or_else(|| UNKNOWN_STR.to_string());
    let second_row: String = hostname.chars().take(lcd.cols() as usize).collect();
    lcd.print(&second_row)?;

    sleep(Duration::from_secs(2));

    debug!("Cursor and blink...");
    lcd.cursor()?;
    lcd.blink()?;
    sleep(Duration::from_secs(2));
    lcd.no_blink()?;
    lcd.no_cursor()?;

    debug!("Scrolling...");
    for _ in 0..4 {
        lcd.scroll_display_left()?;
        sleep(Duration::from_millis(250));
    }
    for _ in 0..4 {
        lcd.scroll_display_right()?;
        sleep(Duration::from_millis(250));
    }

    debug!("Backlight flash...");
    lcd.no_backlight()?;
    sleep(Duration::from_millis(500));
    lcd.backlight()?;

    debug!("Custom character...");
    lcd.create_char(0, &HEART)?;
    lcd.set_cursor(cols.saturating_sub(1), 0)?;
    lcd.send_data(0)?;

    info!("Done.");
    Ok(())
}
