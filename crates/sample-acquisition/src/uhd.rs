//! Ettus USRP front-end through the UHD C API
//!
//! Minimal hand-written bindings; only the calls the acquisition service
//! needs. Samples are requested as SC16 on both the host and the wire.

use std::ffi::{CStr, CString};
use std::os::raw::{c_char, c_double, c_int, c_void};
use std::ptr;

use tracing::{debug, info, warn};

use crate::error::RadioError;
use crate::radio::{OpenParams, RadioFrontEnd};

type UhdError = c_int;
const UHD_ERROR_NONE: UhdError = 0;

type UhdUsrpHandle = *mut c_void;
type UhdRxStreamerHandle = *mut c_void;
type UhdRxMetadataHandle = *mut c_void;
type UhdStringVectorHandle = *mut c_void;
type UhdMetaRangeHandle = *mut c_void;
type UhdSubdevSpecHandle = *mut c_void;

const UHD_TUNE_REQUEST_POLICY_AUTO: c_int = 65;
const UHD_STREAM_MODE_START_CONTINUOUS: c_int = 97;
const UHD_STREAM_MODE_STOP_CONTINUOUS: c_int = 111;
const UHD_RX_METADATA_ERROR_CODE_NONE: c_int = 0x0;
const UHD_RX_METADATA_ERROR_CODE_OVERFLOW: c_int = 0x8;

// Seconds to wait for one packet
const RECV_TIMEOUT: c_double = 3.0;

#[repr(C)]
struct UhdTuneRequest {
    target_freq: c_double,
    rf_freq_policy: c_int,
    rf_freq: c_double,
    dsp_freq_policy: c_int,
    dsp_freq: c_double,
    args: *mut c_char,
}

#[repr(C)]
#[derive(Default)]
struct UhdTuneResult {
    clipped_rf_freq: c_double,
    target_rf_freq: c_double,
    actual_rf_freq: c_double,
    target_dsp_freq: c_double,
    actual_dsp_freq: c_double,
}

#[repr(C)]
struct UhdStreamArgs {
    cpu_format: *mut c_char,
    otw_format: *mut c_char,
    args: *mut c_char,
    channel_list: *mut usize,
    n_channels: c_int,
}

#[repr(C)]
struct UhdStreamCmd {
    stream_mode: c_int,
    num_samps: usize,
    stream_now: bool,
    time_spec_full_secs: i64,
    time_spec_frac_secs: c_double,
}

extern "C" {
    fn uhd_string_vector_make(h: *mut UhdStringVectorHandle) -> UhdError;
    fn uhd_string_vector_free(h: *mut UhdStringVectorHandle) -> UhdError;
    fn uhd_string_vector_size(h: UhdStringVectorHandle, size_out: *mut usize) -> UhdError;
    fn uhd_string_vector_at(
        h: UhdStringVectorHandle,
        index: usize,
        value_out: *mut c_char,
        strbuffer_len: usize,
    ) -> UhdError;

    fn uhd_meta_range_make(h: *mut UhdMetaRangeHandle) -> UhdError;
    fn uhd_meta_range_free(h: *mut UhdMetaRangeHandle) -> UhdError;
    fn uhd_meta_range_start(h: UhdMetaRangeHandle, start_out: *mut c_double) -> UhdError;
    fn uhd_meta_range_stop(h: UhdMetaRangeHandle, stop_out: *mut c_double) -> UhdError;

    fn uhd_subdev_spec_make(h: *mut UhdSubdevSpecHandle, markup: *const c_char) -> UhdError;
    fn uhd_subdev_spec_free(h: *mut UhdSubdevSpecHandle) -> UhdError;

    fn uhd_usrp_make(h: *mut UhdUsrpHandle, args: *const c_char) -> UhdError;
    fn uhd_usrp_free(h: *mut UhdUsrpHandle) -> UhdError;
    fn uhd_usrp_set_master_clock_rate(h: UhdUsrpHandle, rate: c_double, mboard: usize) -> UhdError;
    fn uhd_usrp_set_clock_source(h: UhdUsrpHandle, source: *const c_char, mboard: usize) -> UhdError;
    fn uhd_usrp_set_time_source(h: UhdUsrpHandle, source: *const c_char, mboard: usize) -> UhdError;
    fn uhd_usrp_set_rx_subdev_spec(
        h: UhdUsrpHandle,
        subdev_spec: UhdSubdevSpecHandle,
        mboard: usize,
    ) -> UhdError;
    fn uhd_usrp_set_rx_rate(h: UhdUsrpHandle, rate: c_double, chan: usize) -> UhdError;
    fn uhd_usrp_get_rx_rate(h: UhdUsrpHandle, chan: usize, rate_out: *mut c_double) -> UhdError;
    fn uhd_usrp_set_rx_freq(
        h: UhdUsrpHandle,
        tune_request: *mut UhdTuneRequest,
        chan: usize,
        tune_result: *mut UhdTuneResult,
    ) -> UhdError;
    fn uhd_usrp_get_rx_gain_range(
        h: UhdUsrpHandle,
        name: *const c_char,
        chan: usize,
        gain_range_out: UhdMetaRangeHandle,
    ) -> UhdError;
    fn uhd_usrp_set_rx_gain(
        h: UhdUsrpHandle,
        gain: c_double,
        chan: usize,
        gain_name: *const c_char,
    ) -> UhdError;
    fn uhd_usrp_get_rx_antennas(
        h: UhdUsrpHandle,
        chan: usize,
        antennas_out: *mut UhdStringVectorHandle,
    ) -> UhdError;
    fn uhd_usrp_set_rx_antenna(h: UhdUsrpHandle, ant: *const c_char, chan: usize) -> UhdError;
    fn uhd_usrp_get_rx_stream(
        h: UhdUsrpHandle,
        stream_args: *mut UhdStreamArgs,
        h_out: UhdRxStreamerHandle,
    ) -> UhdError;

    fn uhd_rx_streamer_make(h: *mut UhdRxStreamerHandle) -> UhdError;
    fn uhd_rx_streamer_free(h: *mut UhdRxStreamerHandle) -> UhdError;
    fn uhd_rx_streamer_max_num_samps(h: UhdRxStreamerHandle, max_out: *mut usize) -> UhdError;
    fn uhd_rx_streamer_recv(
        h: UhdRxStreamerHandle,
        buffs: *mut *mut c_void,
        samps_per_buff: usize,
        md: *mut UhdRxMetadataHandle,
        timeout: c_double,
        one_packet: bool,
        items_recvd: *mut usize,
    ) -> UhdError;
    fn uhd_rx_streamer_issue_stream_cmd(
        h: UhdRxStreamerHandle,
        stream_cmd: *const UhdStreamCmd,
    ) -> UhdError;

    fn uhd_rx_metadata_make(h: *mut UhdRxMetadataHandle) -> UhdError;
    fn uhd_rx_metadata_free(h: *mut UhdRxMetadataHandle) -> UhdError;
    fn uhd_rx_metadata_error_code(h: UhdRxMetadataHandle, error_code_out: *mut c_int) -> UhdError;
}

fn check(err: UhdError, call: &str) -> Result<(), RadioError> {
    if err == UHD_ERROR_NONE {
        Ok(())
    } else {
        Err(RadioError::Control(format!("{} failed: error {}", call, err)))
    }
}

fn c_string(s: &str) -> Result<CString, RadioError> {
    CString::new(s).map_err(|e| RadioError::Control(e.to_string()))
}

/// USRP receive front-end
pub struct UhdRadio {
    device_args: String,
    usrp: UhdUsrpHandle,
    rx: UhdRxStreamerHandle,
    md: UhdRxMetadataHandle,
    sample_rate: f64,
    samples_per_packet: usize,
}

// SAFETY: the UHD handles are only used through `&mut self`, and the
// acquisition service serializes all access behind one mutex.
unsafe impl Send for UhdRadio {}

impl UhdRadio {
    /// Create an unopened USRP front-end, e.g. `"type=usrp2"`
    pub fn new(device_args: &str) -> Self {
        Self {
            device_args: device_args.to_string(),
            usrp: ptr::null_mut(),
            rx: ptr::null_mut(),
            md: ptr::null_mut(),
            sample_rate: 0.0,
            samples_per_packet: 0,
        }
    }

    fn require_open(&self) -> Result<(), RadioError> {
        if self.usrp.is_null() {
            Err(RadioError::Control("USRP not open".to_string()))
        } else {
            Ok(())
        }
    }

    fn issue_stream_cmd(&mut self, mode: c_int) -> Result<(), RadioError> {
        self.require_open()?;
        let cmd = UhdStreamCmd {
            stream_mode: mode,
            num_samps: 0,
            stream_now: true,
            time_spec_full_secs: 0,
            time_spec_frac_secs: 0.0,
        };
        // SAFETY: `rx` was created by `uhd_rx_streamer_make` in `open`
        check(
            unsafe { uhd_rx_streamer_issue_stream_cmd(self.rx, &cmd) },
            "uhd_rx_streamer_issue_stream_cmd",
        )
    }

    unsafe fn configure(&mut self, params: &OpenParams) -> Result<(), RadioError> {
        check(
            uhd_usrp_set_master_clock_rate(self.usrp, params.fpga_master_clock_hz as c_double, 0),
            "uhd_usrp_set_master_clock_rate",
        )?;

        let side = if params.subdevice == 0 { "A:0" } else { "B:0" };
        let markup = c_string(side)?;
        let mut spec: UhdSubdevSpecHandle = ptr::null_mut();
        check(uhd_subdev_spec_make(&mut spec, markup.as_ptr()), "uhd_subdev_spec_make")?;
        let err = uhd_usrp_set_rx_subdev_spec(self.usrp, spec, 0);
        uhd_subdev_spec_free(&mut spec);
        check(err, "uhd_usrp_set_rx_subdev_spec")?;

        check(
            uhd_usrp_set_rx_rate(self.usrp, params.sample_rate, 0),
            "uhd_usrp_set_rx_rate",
        )?;
        let mut rate: c_double = 0.0;
        check(uhd_usrp_get_rx_rate(self.usrp, 0, &mut rate), "uhd_usrp_get_rx_rate")?;
        self.sample_rate = rate;

        let clock = c_string(params.clock_source.as_str())?;
        check(
            uhd_usrp_set_clock_source(self.usrp, clock.as_ptr(), 0),
            "uhd_usrp_set_clock_source",
        )?;
        let pps = c_string("external")?;
        check(
            uhd_usrp_set_time_source(self.usrp, pps.as_ptr(), 0),
            "uhd_usrp_set_time_source",
        )?;

        check(uhd_rx_streamer_make(&mut self.rx), "uhd_rx_streamer_make")?;
        check(uhd_rx_metadata_make(&mut self.md), "uhd_rx_metadata_make")?;

        let cpu_fmt = c_string("sc16")?;
        let otw_fmt = c_string("sc16")?;
        let stream_args = c_string("")?;
        let mut channel: usize = 0;
        let mut args = UhdStreamArgs {
            cpu_format: cpu_fmt.as_ptr() as *mut c_char,
            otw_format: otw_fmt.as_ptr() as *mut c_char,
            args: stream_args.as_ptr() as *mut c_char,
            channel_list: &mut channel,
            n_channels: 1,
        };
        check(
            uhd_usrp_get_rx_stream(self.usrp, &mut args, self.rx),
            "uhd_usrp_get_rx_stream",
        )?;

        let mut max_samps: usize = 0;
        check(
            uhd_rx_streamer_max_num_samps(self.rx, &mut max_samps),
            "uhd_rx_streamer_max_num_samps",
        )?;
        self.samples_per_packet = max_samps;
        Ok(())
    }

    fn release(&mut self) {
        // SAFETY: each handle is either null or owned by this struct
        unsafe {
            if !self.md.is_null() {
                uhd_rx_metadata_free(&mut self.md);
            }
            if !self.rx.is_null() {
                uhd_rx_streamer_free(&mut self.rx);
            }
            if !self.usrp.is_null() {
                uhd_usrp_free(&mut self.usrp);
            }
        }
        self.md = ptr::null_mut();
        self.rx = ptr::null_mut();
        self.usrp = ptr::null_mut();
    }
}

impl RadioFrontEnd for UhdRadio {
    fn open(&mut self, params: &OpenParams) -> Result<(), RadioError> {
        if !self.usrp.is_null() {
            return Ok(());
        }
        info!("Opening USRP with args \"{}\"", self.device_args);
        let args = c_string(&self.device_args)?;

        // SAFETY: `usrp` is null and receives a fresh handle
        let err = unsafe { uhd_usrp_make(&mut self.usrp, args.as_ptr()) };
        if err != UHD_ERROR_NONE {
            self.usrp = ptr::null_mut();
            return Err(RadioError::Open(format!("uhd_usrp_make failed: error {}", err)));
        }

        // SAFETY: `usrp` is a valid handle for the rest of `configure`
        if let Err(e) = unsafe { self.configure(params) } {
            self.release();
            return Err(RadioError::Open(e.to_string()));
        }

        debug!(
            "USRP open: {:.3} S/s, {} samples/packet",
            self.sample_rate, self.samples_per_packet
        );
        Ok(())
    }

    fn sample_rate(&self) -> f64 {
        self.sample_rate
    }

    fn samples_per_packet(&self) -> usize {
        self.samples_per_packet
    }

    fn tune(&mut self, freq_hz: f64) -> Result<f64, RadioError> {
        self.require_open()?;
        let mut request = UhdTuneRequest {
            target_freq: freq_hz,
            rf_freq_policy: UHD_TUNE_REQUEST_POLICY_AUTO,
            rf_freq: 0.0,
            dsp_freq_policy: UHD_TUNE_REQUEST_POLICY_AUTO,
            dsp_freq: 0.0,
            args: ptr::null_mut(),
        };
        let mut result = UhdTuneResult::default();

        // SAFETY: valid handle, request and result outlive the call
        let err = unsafe { uhd_usrp_set_rx_freq(self.usrp, &mut request, 0, &mut result) };
        if err != UHD_ERROR_NONE {
            return Err(RadioError::Tune {
                freq_hz,
                reason: format!("uhd_usrp_set_rx_freq error {}", err),
            });
        }
        Ok(result.actual_rf_freq - result.actual_dsp_freq)
    }

    fn gain_range(&self) -> Result<(f64, f64), RadioError> {
        self.require_open()?;
        let name = c_string("")?;
        let mut range: UhdMetaRangeHandle = ptr::null_mut();
        let (mut start, mut stop): (c_double, c_double) = (0.0, 0.0);

        // SAFETY: `range` is created and freed within this block
        unsafe {
            check(uhd_meta_range_make(&mut range), "uhd_meta_range_make")?;
            let result = check(
                uhd_usrp_get_rx_gain_range(self.usrp, name.as_ptr(), 0, range),
                "uhd_usrp_get_rx_gain_range",
            )
            .and_then(|_| check(uhd_meta_range_start(range, &mut start), "uhd_meta_range_start"))
            .and_then(|_| check(uhd_meta_range_stop(range, &mut stop), "uhd_meta_range_stop"));
            uhd_meta_range_free(&mut range);
            result?;
        }
        Ok((start, stop))
    }

    fn set_gain_db(&mut self, gain_db: f64) -> Result<(), RadioError> {
        self.require_open()?;
        let name = c_string("")?;
        // SAFETY: valid handle and NUL-terminated name
        check(
            unsafe { uhd_usrp_set_rx_gain(self.usrp, gain_db, 0, name.as_ptr()) },
            "uhd_usrp_set_rx_gain",
        )
    }

    fn antennas(&self) -> Result<Vec<String>, RadioError> {
        self.require_open()?;
        let mut sv: UhdStringVectorHandle = ptr::null_mut();
        let mut names = Vec::new();

        // SAFETY: `sv` is created and freed within this block
        unsafe {
            check(uhd_string_vector_make(&mut sv), "uhd_string_vector_make")?;
            let result = check(
                uhd_usrp_get_rx_antennas(self.usrp, 0, &mut sv),
                "uhd_usrp_get_rx_antennas",
            );
            if result.is_ok() {
                let mut count: usize = 0;
                uhd_string_vector_size(sv, &mut count);
                let mut buf = vec![0u8; 256];
                for i in 0..count {
                    uhd_string_vector_at(sv, i, buf.as_mut_ptr() as *mut c_char, buf.len());
                    let name = CStr::from_ptr(buf.as_ptr() as *const c_char);
                    names.push(name.to_string_lossy().into_owned());
                }
            }
            uhd_string_vector_free(&mut sv);
            result?;
        }
        Ok(names)
    }

    fn set_antenna(&mut self, name: &str) -> Result<(), RadioError> {
        self.require_open()?;
        let ant = c_string(name)?;
        // SAFETY: valid handle and NUL-terminated name
        check(
            unsafe { uhd_usrp_set_rx_antenna(self.usrp, ant.as_ptr(), 0) },
            "uhd_usrp_set_rx_antenna",
        )
    }

    fn start(&mut self) -> Result<(), RadioError> {
        self.issue_stream_cmd(UHD_STREAM_MODE_START_CONTINUOUS)
    }

    fn stop(&mut self) -> Result<(), RadioError> {
        self.issue_stream_cmd(UHD_STREAM_MODE_STOP_CONTINUOUS)
    }

    fn receive_packet(&mut self, buf: &mut [i16]) -> Result<usize, RadioError> {
        self.require_open()?;
        let capacity = (buf.len() / 2).min(self.samples_per_packet);
        let mut buf_ptr = buf.as_mut_ptr() as *mut c_void;
        let mut received: usize = 0;

        // SAFETY: `buf` holds at least `2 * capacity` i16 words
        let err = unsafe {
            uhd_rx_streamer_recv(
                self.rx,
                &mut buf_ptr,
                capacity,
                &mut self.md,
                RECV_TIMEOUT,
                true,
                &mut received,
            )
        };
        if err != UHD_ERROR_NONE {
            return Err(RadioError::Receive(format!("uhd_rx_streamer_recv error {}", err)));
        }

        let mut code: c_int = 0;
        // SAFETY: metadata handle created in `open`
        unsafe { uhd_rx_metadata_error_code(self.md, &mut code) };
        if code == UHD_RX_METADATA_ERROR_CODE_OVERFLOW {
            // Samples were lost upstream of the host; the packet itself is intact
            warn!("USRP overflow");
        } else if code != UHD_RX_METADATA_ERROR_CODE_NONE {
            return Err(RadioError::Receive(format!("rx metadata error 0x{:x}", code)));
        }
        Ok(received)
    }
}

impl Drop for UhdRadio {
    fn drop(&mut self) {
        self.release();
    }
}
