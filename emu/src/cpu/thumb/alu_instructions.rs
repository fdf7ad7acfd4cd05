use serde::{Deserialize, Serialize};

/// Format 4 operations.
#[derive(Debug, Eq, PartialEq, Copy, Clone, Serialize, Deserialize)]
pub enum ThumbModeAluInstruction {
    And = 0x0,
    Eor = 0x1,
    Lsl = 0x2,
    Lsr = 0x3,
    Asr = 0x4,
    Adc = 0x5,
    Sbc = 0x6,
    Ror = 0x7,
    Tst = 0x8,
    Neg = 0x9,
    Cmp = 0xA,
    Cmn = 0xB,
    Orr = 0xC,
    Mul = 0xD,
    Bic = 0xE,
    Mvn = 0xF,
}

impl ThumbModeAluInstruction {
    /// TST, CMP and CMN only set flags.
    #[must_use]
    pub const fn is_test(self) -> bool {
        matches!(self, Self::Tst | Self::Cmp | Self::Cmn)
    }
}

const ALU_OPERATIONS: [ThumbModeAluInstruction; 16] = {
    use ThumbModeAluInstruction::{
        Adc, And, Asr, Bic, Cmn, Cmp, Eor, Lsl, Lsr, Mul, Mvn, Neg, Orr, Ror, Sbc, Tst,
    };
    [
        And, Eor, Lsl, Lsr, Asr, Adc, Sbc, Ror, Tst, Neg, Cmp, Cmn, Orr, Mul, Bic, Mvn,
    ]
};

const ALU_MNEMONICS: [&str; 16] = [
    "AND", "EOR", "LSL", "LSR", "ASR", "ADC", "SBC", "ROR", "TST", "NEG", "CMP", "CMN", "ORR",
    "MUL", "BIC", "MVN",
];

impl From<u16> for ThumbModeAluInstruction {
    fn from(bits: u16) -> Self {
        ALU_OPERATIONS[usize::from(bits & 0xF)]
    }
}

impl std::fmt::Display for ThumbModeAluInstruction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(ALU_MNEMONICS[*self as usize])
    }
}

/// Format 5 operations. ADD, CMP and MOV reach r8-r15, BX switches state.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ThumbHighRegisterOperation {
    Add,
    Cmp,
    Mov,
    Bx,
}

impl From<u16> for ThumbHighRegisterOperation {
    fn from(bits: u16) -> Self {
        [Self::Add, Self::Cmp, Self::Mov, Self::Bx][usize::from(bits & 0b11)]
    }
}

impl std::fmt::Display for ThumbHighRegisterOperation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(["ADD", "CMP", "MOV", "BX"][*self as usize])
    }
}

/// Format 3 operations on an 8-bit immediate.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Operation {
    Mov,
    Cmp,
    Add,
    Sub,
}

impl From<u16> for Operation {
    fn from(bits: u16) -> Self {
        [Self::Mov, Self::Cmp, Self::Add, Self::Sub][usize::from(bits & 0b11)]
    }
}

impl std::fmt::Display for Operation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(["MOV", "CMP", "ADD", "SUB"][*self as usize])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn every_opcode_prints_its_own_mnemonic() {
        for bits in 0..16u16 {
            let op = ThumbModeAluInstruction::from(bits);
            assert_eq!(op as u16, bits);
            assert_eq!(op.to_string(), ALU_MNEMONICS[usize::from(bits)]);
        }
        assert_eq!(ThumbHighRegisterOperation::Bx.to_string(), "BX");
    }

    #[test]
    fn test_conversion_thumb_alu_op() {
        let op: ThumbModeAluInstruction = 0b0000.into();
        assert_eq!(op, ThumbModeAluInstruction::And);
        let op: ThumbModeAluInstruction = 0b0001.into();
        assert_eq!(op, ThumbModeAluInstruction::Eor);
        let op: ThumbModeAluInstruction = 0b1110.into();
        assert_eq!(op, ThumbModeAluInstruction::Bic);
        let op: ThumbModeAluInstruction = 0b1111.into();
        assert_eq!(op, ThumbModeAluInstruction::Mvn);
        assert!(ThumbModeAluInstruction::Cmn.is_test());
        assert!(!ThumbModeAluInstruction::Neg.is_test());
    }

    #[test]
    fn only_the_low_bits_select_the_operation() {
        assert_eq!(ThumbHighRegisterOperation::from(0b111), ThumbHighRegisterOperation::Bx);
        assert_eq!(Operation::from(0b110), Operation::Add);
        assert_eq!(Operation::Sub.to_string(), "SUB");
    }
}
