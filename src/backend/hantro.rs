// Copyright 2024 The ChromiumOS Authors
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

//! Hantro video decoding cores.
//!
//! A [`HantroDevice`] owns the registers of one decoding core and runs one job at a time on it.
//! What differs between SoC integrations of the core (supported formats, codec programmers and
//! the interrupt, reset and start sequences) is described by a [`Variant`].

pub mod g1;
pub mod g1_regs;
pub mod g1_vp8_dec;
pub mod vp8;

use std::sync::atomic::AtomicU64;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::MutexGuard;
use std::sync::PoisonError;
use std::sync::Weak;
use std::time::Duration;

use crate::decoder::m2m::format::CodecMode;
use crate::decoder::m2m::format::FormatDesc;
use crate::decoder::m2m::format::FrameSizeRange;
use crate::decoder::m2m::format::NV12;
use crate::decoder::m2m::format::VP8F;
use crate::decoder::m2m::job::JobCompletion;
use crate::decoder::m2m::job::JobOutcome;
use crate::decoder::m2m::job::Watchdog;
use crate::decoder::m2m::CodecOps;
use crate::decoder::m2m::M2mError;
use crate::decoder::m2m::RunContext;
use crate::decoder::m2m::RunReport;
use crate::device::regs::poll_timeout;
use crate::device::regs::RegisterAccess;
use crate::device::regs::RegisterField;

/// Tunables of a device.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DeviceConfig {
    /// Time after which a job that did not complete is failed and the hardware reset.
    pub watchdog_timeout: Duration,
    /// Interval between two reads of the busy bit before programming a job.
    pub ready_poll_interval: Duration,
    /// Time after which a hardware still busy from a previous job fails the new one.
    pub ready_timeout: Duration,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            watchdog_timeout: Duration::from_secs(2),
            ready_poll_interval: Duration::from_micros(10),
            ready_timeout: Duration::from_millis(100),
        }
    }
}

/// Description of a hardware variant.
pub struct Variant {
    pub name: &'static str,
    pub formats: &'static [FormatDesc],
    /// Size of the register space.
    pub reg_space_size: u32,
    /// Bit set while the hardware is decoding.
    pub busy: RegisterField,
    /// Returns the programmer for `mode`, if supported.
    pub codec_ops: fn(CodecMode) -> Option<Box<dyn CodecOps>>,
    /// Starts decoding a programmed job.
    pub kick: fn(&mut dyn RegisterAccess),
    /// Brings the hardware back to a known state after a timeout.
    pub reset: fn(&mut dyn RegisterAccess),
    /// Acknowledges the completion interrupt and reports how the job went.
    pub irq: fn(&mut dyn RegisterAccess) -> JobOutcome,
}

impl std::fmt::Debug for Variant {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Variant")
            .field("name", &self.name)
            .field("formats", &self.formats)
            .finish()
    }
}

const G1_FORMATS: [FormatDesc; 2] = [
    FormatDesc {
        fourcc: NV12,
        codec_mode: None,
        max_depth: 0,
        header_size: 0,
        frmsize: None,
    },
    FormatDesc {
        fourcc: VP8F,
        codec_mode: Some(CodecMode::Vp8Dec),
        max_depth: 2,
        header_size: 0,
        frmsize: Some(FrameSizeRange {
            min_width: 48,
            max_width: 3840,
            step_width: vp8::MB_DIM,
            min_height: 48,
            max_height: 2160,
            step_height: vp8::MB_DIM,
        }),
    },
];

fn g1_codec_ops(mode: CodecMode) -> Option<Box<dyn CodecOps>> {
    match mode {
        CodecMode::Vp8Dec => Some(Box::new(g1_vp8_dec::Vp8Decoder::new())),
    }
}

/// The G1 decoding core, as found in RK3288 and i.MX8MQ SoCs.
pub static G1_VARIANT: Variant = Variant {
    name: "hantro-g1",
    formats: &G1_FORMATS,
    reg_space_size: g1_regs::G1_REG_SPACE_SIZE,
    busy: g1_regs::G1_DEC_E,
    codec_ops: g1_codec_ops,
    kick: g1::g1_kick,
    reset: g1::g1_reset,
    irq: g1::g1_irq,
};

/// Whether an interrupt was meant for the device.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum IrqReturn {
    Handled,
    None,
}

struct ActiveJob {
    id: u64,
    completion: Arc<JobCompletion>,
    watchdog: Watchdog,
}

struct Inner<R> {
    variant: &'static Variant,
    config: DeviceConfig,
    regs: Mutex<R>,
    active: Mutex<Option<ActiveJob>>,
    next_job_id: AtomicU64,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl<R: RegisterAccess> Inner<R> {
    /// Called by the watchdog of job `id`.
    fn timeout(&self, id: u64) {
        let mut regs = lock(&self.regs);

        let job = {
            let mut active = lock(&self.active);
            match active.as_ref() {
                Some(job) if job.id == id => active.take(),
                _ => None,
            }
        };

        // The completion interrupt came first.
        let Some(job) = job else {
            return;
        };

        log::error!("frame processing timed out (job {})", id);
        (self.variant.reset)(&mut *regs);
        job.completion.complete(JobOutcome::Timeout);
    }
}

/// Handle to a decoding core. Clones refer to the same hardware.
pub struct HantroDevice<R> {
    inner: Arc<Inner<R>>,
}

impl<R> Clone for HantroDevice<R> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<R: RegisterAccess + Send + 'static> HantroDevice<R> {
    pub fn new(regs: R, variant: &'static Variant, config: DeviceConfig) -> Self {
        log::debug!("{} device: {:?}", variant.name, config);

        Self {
            inner: Arc::new(Inner {
                variant,
                config,
                regs: Mutex::new(regs),
                active: Mutex::new(None),
                next_job_id: AtomicU64::new(0),
            }),
        }
    }

    pub fn variant(&self) -> &'static Variant {
        self.inner.variant
    }

    pub fn config(&self) -> &DeviceConfig {
        &self.inner.config
    }

    /// Whether a job is running on the hardware.
    pub fn is_busy(&self) -> bool {
        lock(&self.inner.active).is_some()
    }

    /// Runs `f` on the registers of the device.
    pub fn with_regs<T, F: FnOnce(&mut R) -> T>(&self, f: F) -> T {
        f(&mut lock(&self.inner.regs))
    }

    /// Programs a job with `codec` and starts the hardware.
    ///
    /// Returns the diagnostics of the programming and the completion slot of the job, which is
    /// completed by [`Self::irq`] or by the watchdog.
    pub fn run(
        &self,
        codec: &mut dyn CodecOps,
        ctx: &RunContext,
    ) -> Result<(RunReport, Arc<JobCompletion>), M2mError> {
        let inner = &self.inner;
        let mut regs = lock(&inner.regs);
        let mut active = lock(&inner.active);

        if active.is_some() {
            return Err(M2mError::Busy);
        }

        let busy = inner.variant.busy;
        poll_timeout(
            &*regs,
            busy.base,
            |value| (value >> busy.shift) & busy.mask == 0,
            inner.config.ready_poll_interval,
            inner.config.ready_timeout,
        )
        .map_err(|e| {
            log::error!("hardware still busy, cannot start job: {}", e);
            M2mError::HardwareNotReady(e)
        })?;

        let report = codec.run(&mut *regs, ctx)?;

        let id = inner.next_job_id.fetch_add(1, Ordering::Relaxed);
        let completion = Arc::new(JobCompletion::new());
        let weak: Weak<Inner<R>> = Arc::downgrade(inner);
        let watchdog = Watchdog::arm(inner.config.watchdog_timeout, move || {
            if let Some(inner) = weak.upgrade() {
                inner.timeout(id);
            }
        })?;

        *active = Some(ActiveJob {
            id,
            completion: Arc::clone(&completion),
            watchdog,
        });

        log::debug!("starting job {}", id);
        (inner.variant.kick)(&mut *regs);

        Ok((report, completion))
    }

    /// Handles the interrupt of the device.
    pub fn irq(&self) -> IrqReturn {
        let (job, outcome) = {
            let mut regs = lock(&self.inner.regs);
            let outcome = (self.inner.variant.irq)(&mut *regs);
            let job = lock(&self.inner.active).take();
            (job, outcome)
        };

        // The watchdog came first.
        let Some(job) = job else {
            log::debug!("spurious interrupt");
            return IrqReturn::None;
        };

        log::debug!("job {} completed: {:?}", job.id, outcome);
        job.watchdog.cancel();
        job.completion.complete(outcome);

        IrqReturn::Handled
    }
}

#[cfg(test)]
mod tests {
    use super::g1_regs::*;
    use super::*;
    use crate::decoder::m2m::format::PixFormat;
    use crate::decoder::m2m::ReferenceLookup;
    use crate::device::dma::DmaAddr;
    use crate::device::dma::DmaAllocator;
    use crate::device::regs::RegisterBank;
    use crate::Resolution;

    /// Codec writing a single register.
    struct MarkerCodec;

    impl CodecOps for MarkerCodec {
        fn init(&mut self, _: &mut dyn DmaAllocator, _: &PixFormat) -> Result<(), M2mError> {
            Ok(())
        }

        fn exit(&mut self, _: &mut dyn DmaAllocator) {}

        fn run(
            &mut self,
            regs: &mut dyn RegisterAccess,
            ctx: &RunContext,
        ) -> Result<RunReport, M2mError> {
            regs.write_relaxed(G1_REG_ADDR_DST, ctx.dst_dma);
            Ok(Default::default())
        }
    }

    struct NoRefs;

    impl ReferenceLookup for NoRefs {
        fn find_reference(&self, _: u64) -> Option<DmaAddr> {
            None
        }
    }

    fn device(watchdog_timeout: Duration) -> HantroDevice<RegisterBank> {
        let _ = env_logger::builder().is_test(true).try_init();

        HantroDevice::new(
            RegisterBank::new(G1_REG_SPACE_SIZE),
            &G1_VARIANT,
            DeviceConfig {
                watchdog_timeout,
                ready_timeout: Duration::from_millis(5),
                ..Default::default()
            },
        )
    }

    fn run(device: &HantroDevice<RegisterBank>) -> Result<Arc<JobCompletion>, M2mError> {
        let dst_format = PixFormat::new(NV12, Resolution::from((64, 64)));
        let ctx = RunContext {
            frame: None,
            src_dma: 0x1000,
            src_data: &[],
            dst_dma: 0x2000,
            dst_format: &dst_format,
            refs: &NoRefs,
        };

        device
            .run(&mut MarkerCodec, &ctx)
            .map(|(_, completion)| completion)
    }

    #[test]
    fn irq_completes_job() {
        let device = device(Duration::from_secs(10));

        let completion = run(&device).unwrap();
        assert!(device.is_busy());
        device.with_regs(|regs| {
            assert_eq!(regs.read(G1_REG_ADDR_DST), 0x2000);
            assert_eq!(regs.writes().last().unwrap().value, G1_REG_INTERRUPT_DEC_E);
            regs.set(G1_REG_INTERRUPT, G1_REG_INTERRUPT_DEC_RDY_INT | G1_REG_INTERRUPT_DEC_IRQ);
        });

        assert_eq!(device.irq(), IrqReturn::Handled);
        assert_eq!(completion.wait(None), Some(JobOutcome::Done));
        assert!(!device.is_busy());

        // No job anymore.
        assert_eq!(device.irq(), IrqReturn::None);
    }

    #[test]
    fn irq_reports_errors() {
        let device = device(Duration::from_secs(10));

        let completion = run(&device).unwrap();
        device.with_regs(|regs| regs.set(G1_REG_INTERRUPT, G1_REG_INTERRUPT_DEC_IRQ));

        assert_eq!(device.irq(), IrqReturn::Handled);
        assert_eq!(completion.outcome(), Some(JobOutcome::Error));
    }

    #[test]
    fn watchdog_resets_hardware() {
        let device = device(Duration::from_millis(20));

        let completion = run(&device).unwrap();
        assert_eq!(completion.wait(None), Some(JobOutcome::Timeout));
        assert!(!device.is_busy());

        device.with_regs(|regs| {
            assert_eq!(regs.read(G1_REG_SOFT_RESET), 1);
            assert_eq!(regs.read(G1_REG_INTERRUPT), G1_REG_INTERRUPT_DEC_IRQ_DIS);
        });

        // A late interrupt does not complete anything.
        assert_eq!(device.irq(), IrqReturn::None);
        assert_eq!(completion.outcome(), Some(JobOutcome::Timeout));

        // The hardware accepts new jobs after the reset.
        assert!(run(&device).is_ok());
    }

    #[test]
    fn one_job_at_a_time() {
        let device = device(Duration::from_secs(10));

        let _completion = run(&device).unwrap();
        assert!(matches!(run(&device), Err(M2mError::Busy)));
    }

    #[test]
    fn hardware_not_ready() {
        let device = device(Duration::from_secs(10));
        device.with_regs(|regs| regs.set(G1_REG_INTERRUPT, G1_REG_INTERRUPT_DEC_E));

        let err = run(&device).unwrap_err();
        assert!(matches!(err, M2mError::HardwareNotReady(_)));
        assert_eq!(err.errno(), -110);
        assert!(!device.is_busy());
        // Nothing was programmed.
        device.with_regs(|regs| assert!(regs.writes().is_empty()));
    }
}
