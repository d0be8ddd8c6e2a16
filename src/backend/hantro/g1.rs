// Copyright 2024 The ChromiumOS Authors
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

//! Interrupt, reset and start sequences of the G1 core.

use crate::backend::hantro::g1_regs::*;
use crate::decoder::m2m::job::JobOutcome;
use crate::device::regs::RegisterAccess;

/// Acknowledges the decoder interrupt and gates the clock until the next job.
pub fn g1_irq(regs: &mut dyn RegisterAccess) -> JobOutcome {
    let status = regs.read(G1_REG_INTERRUPT);
    let outcome = if status & G1_REG_INTERRUPT_DEC_RDY_INT != 0 {
        JobOutcome::Done
    } else {
        log::warn!("decoder interrupt with status {:#010x}", status);
        JobOutcome::Error
    };

    regs.write(G1_REG_INTERRUPT, 0);
    regs.write(G1_REG_CONFIG, G1_REG_CONFIG_DEC_CLK_GATE_E);

    outcome
}

pub fn g1_reset(regs: &mut dyn RegisterAccess) {
    regs.write(G1_REG_INTERRUPT, G1_REG_INTERRUPT_DEC_IRQ_DIS);
    regs.write(G1_REG_CONFIG, G1_REG_CONFIG_DEC_CLK_GATE_E);
    regs.write(G1_REG_SOFT_RESET, 1);
}

pub fn g1_kick(regs: &mut dyn RegisterAccess) {
    regs.write(G1_REG_INTERRUPT, G1_REG_INTERRUPT_DEC_E);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::regs::RegisterBank;
    use crate::device::regs::WriteKind;

    #[test]
    fn irq_acknowledges() {
        let mut regs = RegisterBank::new(G1_REG_SPACE_SIZE);

        regs.set(
            G1_REG_INTERRUPT,
            G1_REG_INTERRUPT_DEC_RDY_INT | G1_REG_INTERRUPT_DEC_IRQ,
        );
        assert_eq!(g1_irq(&mut regs), JobOutcome::Done);
        assert_eq!(regs.read(G1_REG_INTERRUPT), 0);
        assert_eq!(regs.read(G1_REG_CONFIG), G1_REG_CONFIG_DEC_CLK_GATE_E);

        // Any other status is an error, e.g. a bus error or a stream error.
        regs.set(G1_REG_INTERRUPT, G1_REG_INTERRUPT_DEC_IRQ | (1 << 13));
        assert_eq!(g1_irq(&mut regs), JobOutcome::Error);
        assert_eq!(regs.read(G1_REG_INTERRUPT), 0);
    }

    #[test]
    fn reset_sequence() {
        let mut regs = RegisterBank::new(G1_REG_SPACE_SIZE);
        g1_reset(&mut regs);

        let offsets = regs.writes().iter().map(|w| w.offset).collect::<Vec<_>>();
        assert_eq!(
            offsets,
            [G1_REG_INTERRUPT, G1_REG_CONFIG, G1_REG_SOFT_RESET]
        );
        assert_eq!(regs.read(G1_REG_SOFT_RESET), 1);
    }

    #[test]
    fn kick_is_ordered() {
        let mut regs = RegisterBank::new(G1_REG_SPACE_SIZE);
        g1_kick(&mut regs);

        let write = regs.writes()[0];
        assert_eq!(write.kind, WriteKind::Ordered);
        assert_eq!(write.value, G1_REG_INTERRUPT_DEC_E);
        assert_eq!(G1_DEC_E.read(&regs), 1);
    }
}
