//! Provides utilities for deserializing a binary representation of the
//! bytecode.
//!
//! A serialized program is a 16-byte header followed by one fixed-width
//! 16-byte record per instruction, all values little-endian. The header
//! carries a magic word, the instruction count and the byte offset of the
//! first record. Each record holds a 64-bit opcode discriminant and a
//! 64-bit operand: fork and jump targets occupy the low 32 operand bits,
//! a consume range packs its bounds as two 32-bit values.

use crate::{InstAccept, InstConsumeRange, InstFork, InstJmp};

impl InstConsumeRange {
    pub(crate) const OPCODE_BINARY_REPR: u64 = 1;
}

impl InstFork {
    pub(crate) const OPCODE_BINARY_REPR: u64 = 2;
}

impl InstJmp {
    pub(crate) const OPCODE_BINARY_REPR: u64 = 3;
}

impl InstAccept {
    pub(crate) const OPCODE_BINARY_REPR: u64 = 4;
}

/// Attempts to convert a binary representation of the instruction set into
/// its corresponding internal representation.
///
/// # Example
/// ```
/// use regex_nfa_runtime::{Instructions, InstConsumeRange, Opcode, bytecode::FromBytecode};
///
/// let bin = vec![
///     240, 240, 0, 0, 2, 0, 0, 0, 16, 0, 0, 0, 0, 0, 0, 0, 1, 0, 0, 0, 0, 0, 0, 0, 97,
///     0, 0, 0, 97, 0, 0, 0, 4, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0,
/// ];
/// let expected_output = Instructions::new(vec![
///     Opcode::ConsumeRange(InstConsumeRange::new(97, 97)),
///     Opcode::Accept,
/// ]);
/// let decoded_program = Instructions::from_bytecode(bin);
///
/// assert_eq!(
///     Ok(expected_output),
///     decoded_program
/// );
/// ```
pub fn from_binary<B: AsRef<[u8]>>(
    bin: B,
) -> Result<crate::Instructions, BytecodeDeserializationError> {
    crate::Instructions::from_bytecode(bin)
}

/// Represents all error types that may _expectedly_ occur during
/// deserialization.
#[derive(Debug, PartialEq, Eq)]
pub enum BytecodeDeserializationErrorKind {
    /// Generic header errors, triggered at the program header.
    InvalidHeader,
    /// The end of a header is reached prior to completed parsing.
    UnexpectedEndOfHeader,
    IntegerConversionToUsize,
    IntegerConversionTo32Bit,
    /// Represents fallibility of code-unit conversions from a u32 -> u16.
    IntegerConversionTo16Bit,
    /// The width of a given record doesn't align with the expected value.
    ByteWidthMismatch,
    /// Represents a deserialization error for an undefined opcode.
    InvalidOpcode,
    /// A valid opcode has been provided but with an invalid operand.
    InvalidOperand,
    /// A decoded program failed the operand-invariant check.
    FailedIntegrityCheck,
}

/// Represents all error types that may _expectedly_ occur during
/// deserialization. Including the error kind and any optional enriching
/// data.
#[derive(Debug, PartialEq, Eq)]
pub struct BytecodeDeserializationError {
    /// The type of triggered error.
    kind: BytecodeDeserializationErrorKind,
    /// Additional error data.
    data: Option<String>,
}

impl BytecodeDeserializationError {
    /// Instantiates a new error.
    pub fn new(kind: BytecodeDeserializationErrorKind) -> Self {
        Self { kind, data: None }
    }

    /// Associates additional data with the error, returning the modified
    /// error.
    pub fn with_data(mut self, data: String) -> Self {
        self.with_data_mut(data);
        self
    }

    /// Associates additional data with the error.
    pub fn with_data_mut(&mut self, data: String) {
        self.data = Some(data);
    }
}

impl std::fmt::Display for BytecodeDeserializationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let (data, padding) = if let Some(data) = &self.data {
            (data.as_str(), " ")
        } else {
            ("", "")
        };
        match &self.kind {
            BytecodeDeserializationErrorKind::InvalidHeader => {
                if self.data.is_some() {
                    write!(f, "invalid header: {}", data)
                } else {
                    write!(f, "invalid header")
                }
            }
            BytecodeDeserializationErrorKind::UnexpectedEndOfHeader => {
                write!(f, "unexpected end of header")
            }
            BytecodeDeserializationErrorKind::IntegerConversionToUsize => {
                write!(f, "unable to convert {}{}to ptr sized value", data, padding)
            }
            BytecodeDeserializationErrorKind::IntegerConversionTo32Bit => {
                write!(f, "unable to convert {}{}to 32-bit value", data, padding)
            }
            BytecodeDeserializationErrorKind::IntegerConversionTo16Bit => {
                write!(f, "unable to convert {}{}to 16-bit code unit", data, padding)
            }
            BytecodeDeserializationErrorKind::ByteWidthMismatch => {
                write!(f, "byte-width mismatch, {}", data)
            }
            BytecodeDeserializationErrorKind::InvalidOpcode => write!(f, "unknown opcode {}", data),
            BytecodeDeserializationErrorKind::InvalidOperand => {
                write!(f, "invalid operand {}", data)
            }
            BytecodeDeserializationErrorKind::FailedIntegrityCheck => {
                write!(f, "program failed integrity check: {}", data)
            }
        }
    }
}

/// Represents a conversion trait from a given opcodes binary little-endian
/// representation into it's intermediary state.
pub trait FromBytecode<B: AsRef<[u8]>> {
    // The output type of a successful match.
    type Output;
    // An alternate error type.
    type Error;

    fn from_bytecode(bin: B) -> Result<Self::Output, Self::Error>;
}

impl<B: AsRef<[u8]>> FromBytecode<B> for crate::Opcode {
    type Output = Self;
    type Error = BytecodeDeserializationError;

    fn from_bytecode(bin: B) -> Result<Self::Output, Self::Error> {
        use crate::*;

        let data = bin.as_ref();

        let variant = data
            .get(0..8)
            .and_then(|slice| TryInto::<[u8; 8]>::try_into(slice).ok())
            .map(u64::from_le_bytes);
        let operand = data
            .get(8..16)
            .and_then(|slice| TryInto::<[u8; 8]>::try_into(slice).ok())
            .map(u64::from_le_bytes);

        match (variant, operand) {
            (Some(_), None) | (None, None) => Err(BytecodeDeserializationError::new(
                BytecodeDeserializationErrorKind::ByteWidthMismatch,
            )
            .with_data(format!("expected: {}, received: {}", 16, data.len()))),
            (Some(InstConsumeRange::OPCODE_BINARY_REPR), Some(_)) => {
                // safe to unwrap due to the operand width check above.
                let min = data
                    .get(8..12)
                    .and_then(|slice| TryInto::<[u8; 4]>::try_into(slice).ok())
                    .map(u32::from_le_bytes)
                    .unwrap();
                let max = data
                    .get(12..16)
                    .and_then(|slice| TryInto::<[u8; 4]>::try_into(slice).ok())
                    .map(u32::from_le_bytes)
                    .unwrap();

                let min = u16::try_from(min).map_err(|_| {
                    BytecodeDeserializationError::new(
                        BytecodeDeserializationErrorKind::IntegerConversionTo16Bit,
                    )
                    .with_data(min.to_string())
                })?;
                let max = u16::try_from(max).map_err(|_| {
                    BytecodeDeserializationError::new(
                        BytecodeDeserializationErrorKind::IntegerConversionTo16Bit,
                    )
                    .with_data(max.to_string())
                })?;

                Ok(Opcode::ConsumeRange(InstConsumeRange::new(min, max)))
            }
            (Some(InstFork::OPCODE_BINARY_REPR), Some(idx)) => u32::try_from(idx)
                .ok()
                .map(InstIndex::from)
                .map(|inst_idx| Opcode::Fork(InstFork::new(inst_idx)))
                .ok_or_else(|| {
                    BytecodeDeserializationError::new(
                        BytecodeDeserializationErrorKind::IntegerConversionTo32Bit,
                    )
                    .with_data(idx.to_string())
                }),
            (Some(InstJmp::OPCODE_BINARY_REPR), Some(idx)) => u32::try_from(idx)
                .ok()
                .map(InstIndex::from)
                .map(|inst_idx| Opcode::Jmp(InstJmp::new(inst_idx)))
                .ok_or_else(|| {
                    BytecodeDeserializationError::new(
                        BytecodeDeserializationErrorKind::IntegerConversionTo32Bit,
                    )
                    .with_data(idx.to_string())
                }),
            (Some(InstAccept::OPCODE_BINARY_REPR), Some(0)) => Ok(Opcode::Accept),
            (Some(InstAccept::OPCODE_BINARY_REPR), Some(operand)) => {
                Err(BytecodeDeserializationError::new(
                    BytecodeDeserializationErrorKind::InvalidOperand,
                )
                .with_data(operand.to_string()))
            }
            (Some(other_opcode), Some(_)) => Err(BytecodeDeserializationError::new(
                BytecodeDeserializationErrorKind::InvalidOpcode,
            )
            .with_data(format!("{}", other_opcode))),
            _ => unreachable!(),
        }
    }
}

impl<B: AsRef<[u8]>> FromBytecode<B> for crate::Instructions {
    type Output = Self;

    type Error = BytecodeDeserializationError;

    fn from_bytecode(bin: B) -> Result<Self::Output, Self::Error> {
        const CHUNK_32BIT: usize = 4;
        const CHUNK_128BIT: usize = 16;

        // header is 32bits x 4; the magic word, instruction count and
        // instruction offset, with the last 32-bit value unused.
        let mut header = bin
            .as_ref()
            .chunks_exact(CHUNK_32BIT)
            // safe to unwrap due to exact chunk guarantee.
            .map(|v| TryInto::<[u8; 4]>::try_into(v).unwrap())
            .take(3);

        match header.next() {
            Some([0xF0, 0xF0, 0, 0]) => Ok(()),
            Some(_) => Err(BytecodeDeserializationError::new(
                BytecodeDeserializationErrorKind::InvalidHeader,
            )),
            None => Err(BytecodeDeserializationError::new(
                BytecodeDeserializationErrorKind::UnexpectedEndOfHeader,
            )),
        }?;

        let inst_cnt = header
            .next()
            .ok_or_else(|| {
                BytecodeDeserializationError::new(
                    BytecodeDeserializationErrorKind::UnexpectedEndOfHeader,
                )
            })
            .map(u32::from_le_bytes)
            .and_then(|val| {
                usize::try_from(val).map_err(|_| {
                    BytecodeDeserializationError::new(
                        BytecodeDeserializationErrorKind::IntegerConversionToUsize,
                    )
                })
            })?;
        let inst_offset = header
            .next()
            .ok_or_else(|| {
                BytecodeDeserializationError::new(
                    BytecodeDeserializationErrorKind::UnexpectedEndOfHeader,
                )
            })
            .map(u32::from_le_bytes)
            .and_then(|val| {
                usize::try_from(val).map_err(|_| {
                    BytecodeDeserializationError::new(
                        BytecodeDeserializationErrorKind::IntegerConversionToUsize,
                    )
                    .with_data(val.to_string())
                })
            })?;

        let inst_bytes = bin.as_ref().get(inst_offset..).ok_or_else(|| {
            BytecodeDeserializationError::new(BytecodeDeserializationErrorKind::InvalidHeader)
                .with_data(format!("instruction offset {} out of bounds", inst_offset))
        })?;

        let insts = inst_bytes
            .chunks_exact(CHUNK_128BIT)
            .take(inst_cnt)
            .map(crate::Opcode::from_bytecode)
            .collect::<Result<Vec<_>, _>>()?;

        if insts.len() != inst_cnt {
            return Err(BytecodeDeserializationError::new(
                BytecodeDeserializationErrorKind::ByteWidthMismatch,
            )
            .with_data(format!(
                "expected: {} instructions, received: {}",
                inst_cnt,
                insts.len()
            )));
        }

        let program = crate::Instructions::new(insts);
        program.validate().map_err(|e| {
            BytecodeDeserializationError::new(
                BytecodeDeserializationErrorKind::FailedIntegrityCheck,
            )
            .with_data(e.to_string())
        })?;

        Ok(program)
    }
}
