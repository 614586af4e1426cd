//! Named operand conversions applied before a value is placed in a field.

use super::instruction::OperandValue;
use crate::core::error::{CodegenError, CodegenResult};
use crate::core::register::RegisterAssignment;

/// Deterministic conversion from an operand value to a field value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transform {
    /// 32-bit immediate to the ARM "8-bit value rotated right by an even
    /// amount" form: `rotation << 8 | imm8`. Defined for every value in
    /// `0..2^32` whose set bits fit in an 8-bit window at an even rotation
    /// (negative inputs are taken as their 32-bit two's complement); any other
    /// value fails with `EncodingRange`.
    ArmExpandImm,
    /// Register list to a bit mask with bit `n` set for physical register `n`.
    /// Defined for lists of registers numbered below the field width; fails for
    /// unassigned virtual registers.
    RegisterMask,
}

impl Transform {
    pub fn name(&self) -> &'static str {
        match self {
            Transform::ArmExpandImm => "arm_expand_imm",
            Transform::RegisterMask => "register_mask",
        }
    }

    pub fn apply(
        &self,
        operand: &str,
        value: &OperandValue,
        regs: &dyn RegisterAssignment,
    ) -> CodegenResult<i64> {
        match (self, value) {
            (Transform::ArmExpandImm, OperandValue::Imm(imm)) => encode_arm_imm(*imm)
                .map(i64::from)
                .ok_or_else(|| CodegenError::EncodingRange {
                    field: operand.to_string(),
                    value: *imm,
                    constraint: "rotated 8-bit immediate".to_string(),
                }),
            (Transform::RegisterMask, OperandValue::RegList(list)) => {
                let mut mask = 0i64;
                for reg in list {
                    let phys = reg.resolve(regs).ok_or_else(|| CodegenError::UnassignedRegister {
                        register: format!("{:?}", reg),
                    })?;
                    if phys.id >= 32 {
                        return Err(CodegenError::EncodingRange {
                            field: operand.to_string(),
                            value: i64::from(phys.id),
                            constraint: "register number below 32".to_string(),
                        });
                    }
                    mask |= 1 << phys.id;
                }
                Ok(mask)
            }
            (transform, value) => Err(CodegenError::InvalidOperand {
                instruction: operand.to_string(),
                reason: format!("{} cannot convert {:?}", transform.name(), value),
            }),
        }
    }
}

/// Rotate-encode a 32-bit immediate for ARM data-processing instructions.
pub fn encode_arm_imm(value: i64) -> Option<u32> {
    if value < i64::from(i32::MIN) || value > i64::from(u32::MAX) {
        return None;
    }
    let value = value as u32;
    (0..16u32).find_map(|rotation| {
        let rotated = value.rotate_left(rotation * 2);
        (rotated & !0xFF == 0).then_some((rotation << 8) | rotated)
    })
}

/// Inverse of [`encode_arm_imm`].
pub fn decode_arm_imm(encoded: u32) -> u32 {
    let rotation = (encoded >> 8) & 0xF;
    (encoded & 0xFF).rotate_right(rotation * 2)
}
