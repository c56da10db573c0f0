use std::{thread, time::Duration};

use anyhow::{anyhow, bail, Context};
use embedded_svc::wifi::{AuthMethod, ClientConfiguration, Configuration};
use esp_idf_hal::{
    adc::{
        attenuation::DB_11,
        oneshot::{config::AdcChannelConfig, AdcChannelDriver, AdcDriver},
        ADC1,
    },
    delay::FreeRtos,
    gpio::{Gpio2, Gpio34, Gpio5, Input, Output, PinDriver, Pull},
};
use esp_idf_svc::{
    eventloop::EspSystemEventLoop,
    hal::{modem::Modem, prelude::Peripherals},
    log::EspLogger,
    nvs::EspDefaultNvsPartition,
    wifi::{BlockingWifi, EspWifi},
};
use log::{info, warn};

use statusboard_common::{
    config::NetworkConfig, Board, CalibrationConfig, EventLoop, RuntimeConfig, SharedStore,
    SocketStack,
};

const WATCHDOG_TIMEOUT_SEC: u32 = 30;
const WIFI_CONNECT_ATTEMPTS: u32 = 5;
const WIFI_RETRY_DELAY_MS: u64 = 3_000;

pub fn run() -> anyhow::Result<()> {
    esp_idf_svc::sys::link_patches();
    EspLogger::initialize_default();

    let sys_loop = EspSystemEventLoop::take()?;
    let nvs_partition = EspDefaultNvsPartition::take()?;

    let mut runtime = RuntimeConfig::default();
    runtime.monitor.calibration = CalibrationConfig::tmp36();
    runtime.network = NetworkConfig {
        wifi_ssid: option_env!("WIFI_SSID").unwrap_or_default().to_string(),
        wifi_pass: option_env!("WIFI_PASS").unwrap_or_default().to_string(),
    };

    let Peripherals {
        modem, pins, adc1, ..
    } = Peripherals::take()?;

    let board = DeviceBoard::new(pins.gpio5, pins.gpio2, adc1, pins.gpio34)
        .context("failed to initialize board peripherals")?;

    // Keep the driver alive for the program lifetime.
    let _wifi = connect_wifi(modem, sys_loop, nvs_partition, &runtime.network)
        .context("wifi startup failed")?;

    init_watchdog(WATCHDOG_TIMEOUT_SEC)?;
    add_current_task_to_watchdog()?;

    let monitor = runtime.monitor;
    let store = SharedStore::new(monitor.event_log_capacity);
    let stack = SocketStack::new(monitor.send_buffer_size);
    let mut event_loop = EventLoop::start(&monitor, board, stack, store)
        .with_context(|| format!("failed to start http responder on port {}", monitor.http_port))?;

    let tick_ms = u32::try_from(monitor.tick_ms).unwrap_or(10);
    loop {
        feed_watchdog();
        event_loop.run_once();
        FreeRtos::delay_ms(tick_ms);
    }
}

struct DeviceBoard {
    button: PinDriver<'static, Gpio5, Input>,
    indicator: PinDriver<'static, Gpio2, Output>,
    temperature: AdcChannelDriver<'static, Gpio34, AdcDriver<'static, ADC1>>,
}

impl DeviceBoard {
    fn new(button: Gpio5, indicator: Gpio2, adc: ADC1, sensor: Gpio34) -> anyhow::Result<Self> {
        let mut button = PinDriver::input(button)?;
        button.set_pull(Pull::Up)?;

        let mut indicator = PinDriver::output(indicator)?;
        indicator.set_low()?;

        let adc = AdcDriver::new(adc)?;
        let channel_config = AdcChannelConfig {
            attenuation: DB_11,
            ..Default::default()
        };
        let temperature = AdcChannelDriver::new(adc, sensor, &channel_config)?;

        Ok(Self {
            button,
            indicator,
            temperature,
        })
    }
}

impl Board for DeviceBoard {
    fn button_level(&mut self) -> bool {
        self.button.is_high()
    }

    fn set_indicator(&mut self, on: bool) {
        let result = if on {
            self.indicator.set_high()
        } else {
            self.indicator.set_low()
        };
        if let Err(err) = result {
            warn!("failed to drive indicator: {err:?}");
        }
    }

    fn temperature_raw(&mut self) -> u16 {
        match self.temperature.read_raw() {
            Ok(raw) => raw,
            Err(err) => {
                warn!("adc read failed: {err:?}");
                0
            }
        }
    }

    fn now_ms(&self) -> u64 {
        let micros = unsafe { esp_idf_svc::sys::esp_timer_get_time() };
        u64::try_from(micros).unwrap_or(0) / 1_000
    }
}

fn connect_wifi(
    modem: Modem,
    sys_loop: EspSystemEventLoop,
    nvs_partition: EspDefaultNvsPartition,
    network: &NetworkConfig,
) -> anyhow::Result<EspWifi<'static>> {
    if !network.has_station_credentials() {
        bail!("wifi credentials missing; build with WIFI_SSID and WIFI_PASS set");
    }

    let mut esp_wifi = EspWifi::new(modem, sys_loop.clone(), Some(nvs_partition))?;
    let mut wifi = BlockingWifi::wrap(&mut esp_wifi, sys_loop)?;

    let auth_method = if network.wifi_pass.is_empty() {
        AuthMethod::None
    } else {
        AuthMethod::WPAWPA2Personal
    };

    wifi.set_configuration(&Configuration::Client(ClientConfiguration {
        ssid: network
            .wifi_ssid
            .as_str()
            .try_into()
            .map_err(|_| anyhow!("wifi ssid too long"))?,
        password: network
            .wifi_pass
            .as_str()
            .try_into()
            .map_err(|_| anyhow!("wifi password too long"))?,
        auth_method,
        ..Default::default()
    }))?;

    wifi.start()?;
    info!("wifi started, connecting to `{}`", network.wifi_ssid);

    let mut last_err = None;
    for attempt in 1..=WIFI_CONNECT_ATTEMPTS {
        info!("wifi connect attempt {attempt}/{WIFI_CONNECT_ATTEMPTS}");
        match wifi.connect().and_then(|()| wifi.wait_netif_up()) {
            Ok(()) => {
                last_err = None;
                break;
            }
            Err(err) => {
                warn!("wifi connect failed on attempt {attempt}: {err:#}");
                last_err = Some(err);
            }
        }

        if attempt < WIFI_CONNECT_ATTEMPTS {
            let _ = wifi.disconnect();
            thread::sleep(Duration::from_millis(WIFI_RETRY_DELAY_MS));
        }
    }

    if let Some(err) = last_err {
        let _ = wifi.stop();
        return Err(anyhow::Error::from(err).context(format!(
            "all {WIFI_CONNECT_ATTEMPTS} wifi connect attempts failed"
        )));
    }

    let ip_info = wifi.wifi().sta_netif().get_ip_info()?;
    info!("wifi connected, ip address {}", ip_info.ip);

    drop(wifi);
    Ok(esp_wifi)
}

fn init_watchdog(timeout_sec: u32) -> anyhow::Result<()> {
    let config = esp_idf_svc::sys::esp_task_wdt_config_t {
        timeout_ms: timeout_sec.saturating_mul(1000),
        idle_core_mask: 0,
        trigger_panic: true,
    };
    let rc = unsafe { esp_idf_svc::sys::esp_task_wdt_init(&config) };
    if rc == esp_idf_svc::sys::ESP_OK || rc == esp_idf_svc::sys::ESP_ERR_INVALID_STATE {
        return Ok(());
    }
    Err(anyhow!("esp_task_wdt_init failed with code {}", rc))
}

fn add_current_task_to_watchdog() -> anyhow::Result<()> {
    let rc = unsafe { esp_idf_svc::sys::esp_task_wdt_add(core::ptr::null_mut()) };
    if rc == esp_idf_svc::sys::ESP_OK || rc == esp_idf_svc::sys::ESP_ERR_INVALID_STATE {
        return Ok(());
    }
    Err(anyhow!("esp_task_wdt_add failed with code {}", rc))
}

fn feed_watchdog() {
    let _ = unsafe { esp_idf_svc::sys::esp_task_wdt_reset() };
}
