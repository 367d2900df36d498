//! Per-function validation: abstract interpretation over an operand-type stack and a control
//! frame stack. Besides accepting or rejecting the body it records every structured jump in a
//! [`SideTable`] so the interpreter never has to rediscover block boundaries.

use std::iter;

use tracing::trace;

use super::side_table::{BranchTarget, Fixup, Jump, SideTable};
use crate::binary::{self, cursor::Cursor, leb128, reader::read_vec};
use crate::error::{ValidationError, ValidationErrorKind as Kind};
use crate::model::{FuncIdx, FuncType, FunctionBody, Module, ValType};
use crate::vm::instructions::op;

/// Upper bound on parameters plus declared locals of one function.
pub const MAX_FUNCTION_LOCALS: u64 = 50_000;

type KResult<T> = Result<T, Kind>;

/// Validation output for one defined function.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CompiledBody {
    pub side_table: SideTable,
    /// Declared locals, excluding parameters.
    pub num_locals: u32,
    /// Highest operand stack height the body can reach.
    pub max_height: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Operand {
    Known(ValType),
    /// Produced by popping from an unreachable (stack-polymorphic) frame.
    Unknown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CtrlKind {
    Function,
    Block,
    Loop,
    If,
    Else,
}

#[derive(Debug)]
struct Ctrl {
    kind: CtrlKind,
    result: Option<ValType>,
    height: usize,
    unreachable: bool,
    /// First instruction of the body; the branch target of a loop.
    start_pc: usize,
    /// The `if` or `else` waiting for the offset that follows its arm.
    pending: Option<Fixup>,
    /// Forward branches to this frame's `end`.
    fixups: Vec<Fixup>,
}

impl Ctrl {
    fn label_type(&self) -> Option<ValType> {
        match self.kind {
            CtrlKind::Loop => None,
            _ => self.result,
        }
    }
}

struct FuncValidator<'m> {
    module: &'m Module,
    locals: Vec<ValType>,
    result: Option<ValType>,
    vals: Vec<Operand>,
    ctrls: Vec<Ctrl>,
    table: SideTable,
    max_height: usize,
}

/// Validate the body of defined function `func` with signature `ty`.
pub(crate) fn validate_function(
    module: &Module,
    func: FuncIdx,
    ty: &FuncType,
    body: &FunctionBody,
) -> Result<CompiledBody, ValidationError> {
    let declared = body.local_count();
    if ty.params.len() as u64 + declared > MAX_FUNCTION_LOCALS {
        return Err(ValidationError::in_func(Kind::TooManyLocals, func, body.offset));
    }
    let mut locals = ty.params.clone();
    for decl in &body.locals {
        locals.extend(iter::repeat(decl.val_type).take(decl.count as usize));
    }

    let result = ty.results.first().copied();
    let mut v = FuncValidator {
        module,
        locals,
        result,
        vals: Vec::new(),
        ctrls: Vec::new(),
        table: SideTable::default(),
        max_height: 0,
    };
    v.push_ctrl(CtrlKind::Function, result, 0);

    let mut cur = Cursor::new(&body.code);
    while !cur.is_eof() {
        let pc = cur.position();
        v.step(&mut cur, pc)
            .map_err(|kind| ValidationError::in_func(kind, func, body.offset + pc))?;
        if v.ctrls.is_empty() {
            if !cur.is_eof() {
                return Err(ValidationError::in_func(
                    Kind::Malformed("instructions after the final end"),
                    func,
                    body.offset + cur.position(),
                ));
            }
            trace!(func, jumps = v.table.len(), max_height = v.max_height, "validated body");
            return Ok(CompiledBody {
                side_table: v.table,
                num_locals: declared as u32,
                max_height: v.max_height as u32,
            });
        }
    }
    Err(ValidationError::in_func(
        Kind::Malformed("missing final end"),
        func,
        body.offset + body.code.len(),
    ))
}

fn imm<T>(r: binary::Result<T>) -> KResult<T> {
    r.map_err(|_| Kind::Malformed("truncated or malformed immediate"))
}

impl<'m> FuncValidator<'m> {
    fn step(&mut self, cur: &mut Cursor, pc: usize) -> KResult<()> {
        use ValType::*;

        let opcode = imm(cur.read_u8())?;
        match opcode {
            op::UNREACHABLE => self.set_unreachable(),
            op::NOP => {}
            op::BLOCK | op::LOOP => {
                let result = self.block_type(cur)?;
                let kind = if opcode == op::BLOCK {
                    CtrlKind::Block
                } else {
                    CtrlKind::Loop
                };
                self.push_ctrl(kind, result, cur.position());
            }
            op::IF => {
                let result = self.block_type(cur)?;
                self.pop_expect(I32)?;
                self.table.insert(pc, Jump::If { else_pc: 0 });
                self.push_ctrl(CtrlKind::If, result, cur.position());
                self.top_mut()?.pending = Some(Fixup::If(pc));
            }
            op::ELSE => {
                if self.top()?.kind != CtrlKind::If {
                    return Err(Kind::Malformed("else without matching if"));
                }
                self.check_frame_end()?;
                let after_else = cur.position();
                let frame = self.top_mut()?;
                let pending = frame.pending.replace(Fixup::Else(pc));
                frame.kind = CtrlKind::Else;
                frame.unreachable = false;
                if let Some(fixup) = pending {
                    self.table.patch(fixup, after_else);
                }
                self.table.insert(pc, Jump::Else { end_pc: 0 });
            }
            op::END => {
                let frame = self.top()?;
                if frame.kind == CtrlKind::If && frame.result.is_some() {
                    return Err(Kind::UnbalancedStack {
                        expected: 1,
                        found: 0,
                    });
                }
                self.check_frame_end()?;
                let frame = self.ctrls.pop().ok_or(Kind::Malformed("unbalanced end"))?;
                for fixup in frame.pending.into_iter().chain(frame.fixups) {
                    self.table.patch(fixup, pc);
                }
                if let Some(t) = frame.result {
                    self.push(Operand::Known(t));
                }
            }
            op::BR => {
                let depth = imm(leb128::read_uleb_u32(cur))?;
                let target = self.branch_target(depth, Fixup::Br(pc))?;
                let label = self.label_type(depth)?;
                self.pop_opt(label)?;
                self.table.insert(pc, Jump::Br(target));
                self.set_unreachable();
            }
            op::BR_IF => {
                let depth = imm(leb128::read_uleb_u32(cur))?;
                self.pop_expect(I32)?;
                let target = self.branch_target(depth, Fixup::Br(pc))?;
                let label = self.label_type(depth)?;
                self.pop_opt(label)?;
                if let Some(t) = label {
                    self.push(Operand::Known(t));
                }
                self.table.insert(pc, Jump::Br(target));
            }
            op::BR_TABLE => {
                let depths = imm(read_vec(cur, leb128::read_uleb_u32))?;
                let default = imm(leb128::read_uleb_u32(cur))?;
                self.pop_expect(I32)?;
                let label = self.label_type(default)?;
                let mut targets = Vec::with_capacity(depths.len() + 1);
                for (slot, &depth) in depths.iter().chain(iter::once(&default)).enumerate() {
                    if self.label_type(depth)? != label {
                        return Err(Kind::BranchArityMismatch);
                    }
                    targets.push(self.branch_target(depth, Fixup::BrTable { pc, slot })?);
                }
                self.pop_opt(label)?;
                self.table
                    .insert(pc, Jump::BrTable(targets.into_boxed_slice()));
                self.set_unreachable();
            }
            op::RETURN => {
                self.pop_opt(self.result)?;
                self.set_unreachable();
            }

            op::CALL => {
                let index = imm(leb128::read_uleb_u32(cur))?;
                let module = self.module;
                let ty = module.func_type(index).ok_or(Kind::UnknownFunction(index))?;
                self.apply_call(ty)?;
            }
            op::CALL_INDIRECT => {
                let type_idx = imm(leb128::read_uleb_u32(cur))?;
                if imm(cur.read_u8())? != 0 {
                    return Err(Kind::Malformed("call_indirect reserved byte must be zero"));
                }
                let module = self.module;
                if module.tables.is_empty() {
                    return Err(Kind::UnknownTable(0));
                }
                let ty = module
                    .types
                    .get(type_idx as usize)
                    .ok_or(Kind::UnknownType(type_idx))?;
                self.pop_expect(I32)?;
                self.apply_call(ty)?;
            }

            op::DROP => {
                self.pop_any()?;
            }
            op::SELECT => {
                self.pop_expect(I32)?;
                let a = self.pop_any()?;
                let b = self.pop_any()?;
                let chosen = match (a, b) {
                    (Operand::Known(x), Operand::Known(y)) if x != y => {
                        return Err(Kind::TypeMismatch {
                            expected: y,
                            found: x,
                        })
                    }
                    (Operand::Unknown, other) => other,
                    (known, _) => known,
                };
                self.push(chosen);
            }

            op::LOCAL_GET | op::LOCAL_SET | op::LOCAL_TEE => {
                let index = imm(leb128::read_uleb_u32(cur))?;
                let ty = *self
                    .locals
                    .get(index as usize)
                    .ok_or(Kind::UnknownLocal(index))?;
                if opcode != op::LOCAL_GET {
                    self.pop_expect(ty)?;
                }
                if opcode != op::LOCAL_SET {
                    self.push(Operand::Known(ty));
                }
            }
            op::GLOBAL_GET | op::GLOBAL_SET => {
                let index = imm(leb128::read_uleb_u32(cur))?;
                let global = self
                    .module
                    .globals
                    .get(index as usize)
                    .ok_or(Kind::UnknownGlobal(index))?
                    .ty;
                if opcode == op::GLOBAL_GET {
                    self.push(Operand::Known(global.val_type));
                } else {
                    if !global.mutable {
                        return Err(Kind::ImmutableGlobal(index));
                    }
                    self.pop_expect(global.val_type)?;
                }
            }

            op::I32_LOAD..=op::I64_LOAD32_U => {
                let (ty, natural) = load_type(opcode).ok_or(Kind::InvalidOpcode(opcode))?;
                self.memarg(cur, natural)?;
                self.pop_expect(I32)?;
                self.push(Operand::Known(ty));
            }
            op::I32_STORE..=op::I64_STORE32 => {
                let (ty, natural) = store_type(opcode).ok_or(Kind::InvalidOpcode(opcode))?;
                self.memarg(cur, natural)?;
                self.pop_expect(ty)?;
                self.pop_expect(I32)?;
            }
            op::MEMORY_SIZE | op::MEMORY_GROW => {
                if imm(cur.read_u8())? != 0 {
                    return Err(Kind::Malformed("memory instruction reserved byte must be zero"));
                }
                self.require_memory()?;
                if opcode == op::MEMORY_GROW {
                    self.pop_expect(I32)?;
                }
                self.push(Operand::Known(I32));
            }

            op::I32_CONST => {
                imm(leb128::read_sleb_i32(cur))?;
                self.push(Operand::Known(I32));
            }
            op::I64_CONST => {
                imm(leb128::read_sleb_i64(cur))?;
                self.push(Operand::Known(I64));
            }
            op::F32_CONST => {
                imm(cur.read_f32_bits())?;
                self.push(Operand::Known(F32));
            }
            op::F64_CONST => {
                imm(cur.read_f64_bits())?;
                self.push(Operand::Known(F64));
            }

            other => {
                let (params, result) = numeric_signature(other).ok_or(Kind::InvalidOpcode(other))?;
                for &p in params.iter().rev() {
                    self.pop_expect(p)?;
                }
                self.push(Operand::Known(result));
            }
        }
        Ok(())
    }

    fn push(&mut self, operand: Operand) {
        self.vals.push(operand);
        self.max_height = self.max_height.max(self.vals.len());
    }

    fn pop_any(&mut self) -> KResult<Operand> {
        let frame = self.top()?;
        if self.vals.len() == frame.height {
            return if frame.unreachable {
                Ok(Operand::Unknown)
            } else {
                Err(Kind::StackUnderflow)
            };
        }
        self.vals.pop().ok_or(Kind::StackUnderflow)
    }

    fn pop_expect(&mut self, expected: ValType) -> KResult<Operand> {
        match self.pop_any()? {
            Operand::Known(found) if found != expected => Err(Kind::TypeMismatch { expected, found }),
            operand => Ok(operand),
        }
    }

    fn pop_opt(&mut self, expected: Option<ValType>) -> KResult<()> {
        if let Some(t) = expected {
            self.pop_expect(t)?;
        }
        Ok(())
    }

    fn apply_call(&mut self, ty: &FuncType) -> KResult<()> {
        for &p in ty.params.iter().rev() {
            self.pop_expect(p)?;
        }
        for &r in &ty.results {
            self.push(Operand::Known(r));
        }
        Ok(())
    }

    fn push_ctrl(&mut self, kind: CtrlKind, result: Option<ValType>, start_pc: usize) {
        self.ctrls.push(Ctrl {
            kind,
            result,
            height: self.vals.len(),
            unreachable: false,
            start_pc,
            pending: None,
            fixups: Vec::new(),
        });
    }

    fn top(&self) -> KResult<&Ctrl> {
        self.ctrls.last().ok_or(Kind::Malformed("instruction outside of any block"))
    }

    fn top_mut(&mut self) -> KResult<&mut Ctrl> {
        self.ctrls
            .last_mut()
            .ok_or(Kind::Malformed("instruction outside of any block"))
    }

    fn set_unreachable(&mut self) {
        if let Some(frame) = self.ctrls.last_mut() {
            self.vals.truncate(frame.height);
            frame.unreachable = true;
        }
    }

    /// Pop the frame's results and require the stack to be back at the frame's floor.
    fn check_frame_end(&mut self) -> KResult<()> {
        let frame = self.top()?;
        let (result, height, unreachable) = (frame.result, frame.height, frame.unreachable);
        let expected = result.is_some() as usize;
        let found = self.vals.len() - height;
        if found > expected || (found < expected && !unreachable) {
            return Err(Kind::UnbalancedStack { expected, found });
        }
        self.pop_opt(result)?;
        self.vals.truncate(height);
        Ok(())
    }

    fn frame_at(&self, depth: u32) -> KResult<usize> {
        self.ctrls
            .len()
            .checked_sub(depth as usize + 1)
            .ok_or(Kind::InvalidBranchDepth(depth))
    }

    fn label_type(&self, depth: u32) -> KResult<Option<ValType>> {
        Ok(self.ctrls[self.frame_at(depth)?].label_type())
    }

    /// Target of a branch to `depth`. Forward targets are completed when the label's `end` is
    /// reached.
    fn branch_target(&mut self, depth: u32, fixup: Fixup) -> KResult<BranchTarget> {
        let index = self.frame_at(depth)?;
        let frame = &mut self.ctrls[index];
        let mut target = BranchTarget {
            pc: 0,
            arity: frame.label_type().is_some() as u32,
            height: frame.height as u32,
        };
        if frame.kind == CtrlKind::Loop {
            target.pc = frame.start_pc as u32;
        } else {
            frame.fixups.push(fixup);
        }
        Ok(target)
    }

    fn block_type(&self, cur: &mut Cursor) -> KResult<Option<ValType>> {
        match imm(cur.read_u8())? {
            0x40 => Ok(None),
            b => ValType::from_byte(b)
                .map(Some)
                .ok_or(Kind::UnsupportedBlockType(b)),
        }
    }

    fn require_memory(&self) -> KResult<()> {
        if self.module.memories.is_empty() {
            return Err(Kind::UnknownMemory(0));
        }
        Ok(())
    }

    fn memarg(&self, cur: &mut Cursor, natural: u32) -> KResult<()> {
        let align = imm(leb128::read_uleb_u32(cur))?;
        imm(leb128::read_uleb_u32(cur))?;
        self.require_memory()?;
        if align > natural {
            return Err(Kind::InvalidAlignment { align, natural });
        }
        Ok(())
    }
}

/// Loaded type and natural alignment (log2 of the access width).
pub(crate) fn load_type(opcode: u8) -> Option<(ValType, u32)> {
    use ValType::*;
    Some(match opcode {
        op::I32_LOAD => (I32, 2),
        op::I64_LOAD => (I64, 3),
        op::F32_LOAD => (F32, 2),
        op::F64_LOAD => (F64, 3),
        op::I32_LOAD8_S | op::I32_LOAD8_U => (I32, 0),
        op::I32_LOAD16_S | op::I32_LOAD16_U => (I32, 1),
        op::I64_LOAD8_S | op::I64_LOAD8_U => (I64, 0),
        op::I64_LOAD16_S | op::I64_LOAD16_U => (I64, 1),
        op::I64_LOAD32_S | op::I64_LOAD32_U => (I64, 2),
        _ => return None,
    })
}

pub(crate) fn store_type(opcode: u8) -> Option<(ValType, u32)> {
    use ValType::*;
    Some(match opcode {
        op::I32_STORE => (I32, 2),
        op::I64_STORE => (I64, 3),
        op::F32_STORE => (F32, 2),
        op::F64_STORE => (F64, 3),
        op::I32_STORE8 => (I32, 0),
        op::I32_STORE16 => (I32, 1),
        op::I64_STORE8 => (I64, 0),
        op::I64_STORE16 => (I64, 1),
        op::I64_STORE32 => (I64, 2),
        _ => return None,
    })
}

const I32_1: &[ValType] = &[ValType::I32];
const I32_2: &[ValType] = &[ValType::I32, ValType::I32];
const I64_1: &[ValType] = &[ValType::I64];
const I64_2: &[ValType] = &[ValType::I64, ValType::I64];
const F32_1: &[ValType] = &[ValType::F32];
const F32_2: &[ValType] = &[ValType::F32, ValType::F32];
const F64_1: &[ValType] = &[ValType::F64];
const F64_2: &[ValType] = &[ValType::F64, ValType::F64];

/// Operand and result types of the numeric, comparison and conversion instructions.
fn numeric_signature(opcode: u8) -> Option<(&'static [ValType], ValType)> {
    use ValType::*;
    Some(match opcode {
        op::I32_EQZ => (I32_1, I32),
        op::I32_EQ..=op::I32_GE_U => (I32_2, I32),
        op::I64_EQZ => (I64_1, I32),
        op::I64_EQ..=op::I64_GE_U => (I64_2, I32),
        op::F32_EQ..=op::F32_GE => (F32_2, I32),
        op::F64_EQ..=op::F64_GE => (F64_2, I32),

        op::I32_CLZ..=op::I32_POPCNT => (I32_1, I32),
        op::I32_ADD..=op::I32_ROTR => (I32_2, I32),
        op::I64_CLZ..=op::I64_POPCNT => (I64_1, I64),
        op::I64_ADD..=op::I64_ROTR => (I64_2, I64),
        op::F32_ABS..=op::F32_SQRT => (F32_1, F32),
        op::F32_ADD..=op::F32_COPYSIGN => (F32_2, F32),
        op::F64_ABS..=op::F64_SQRT => (F64_1, F64),
        op::F64_ADD..=op::F64_COPYSIGN => (F64_2, F64),

        op::I32_WRAP_I64 => (I64_1, I32),
        op::I32_TRUNC_F32_S | op::I32_TRUNC_F32_U => (F32_1, I32),
        op::I32_TRUNC_F64_S | op::I32_TRUNC_F64_U => (F64_1, I32),
        op::I64_EXTEND_I32_S | op::I64_EXTEND_I32_U => (I32_1, I64),
        op::I64_TRUNC_F32_S | op::I64_TRUNC_F32_U => (F32_1, I64),
        op::I64_TRUNC_F64_S | op::I64_TRUNC_F64_U => (F64_1, I64),
        op::F32_CONVERT_I32_S | op::F32_CONVERT_I32_U => (I32_1, F32),
        op::F32_CONVERT_I64_S | op::F32_CONVERT_I64_U => (I64_1, F32),
        op::F32_DEMOTE_F64 => (F64_1, F32),
        op::F64_CONVERT_I32_S | op::F64_CONVERT_I32_U => (I32_1, F64),
        op::F64_CONVERT_I64_S | op::F64_CONVERT_I64_U => (I64_1, F64),
        op::F64_PROMOTE_F32 => (F32_1, F64),

        op::I32_REINTERPRET_F32 => (F32_1, I32),
        op::I64_REINTERPRET_F64 => (F64_1, I64),
        op::F32_REINTERPRET_I32 => (I32_1, F32),
        op::F64_REINTERPRET_I64 => (I64_1, F64),
        _ => return None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{FuncKind, Function, LocalDecl, MemoryType};

    fn check(
        ty: FuncType,
        locals: &[LocalDecl],
        code: &[u8],
    ) -> Result<CompiledBody, ValidationError> {
        check_in(Module::default(), ty, locals, code)
    }

    fn check_in(
        mut module: Module,
        ty: FuncType,
        locals: &[LocalDecl],
        code: &[u8],
    ) -> Result<CompiledBody, ValidationError> {
        module.types.push(ty.clone());
        module.functions.push(Function {
            type_idx: (module.types.len() - 1) as u32,
            kind: FuncKind::Defined { body: 0 },
        });
        let body = FunctionBody {
            locals: locals.to_vec(),
            code: code.to_vec(),
            offset: 100,
        };
        let func = (module.functions.len() - 1) as u32;
        validate_function(&module, func, &ty, &body)
    }

    fn kind(r: Result<CompiledBody, ValidationError>) -> Kind {
        r.unwrap_err().kind
    }

    fn returns_i32() -> FuncType {
        FuncType::new(&[], &[ValType::I32])
    }

    #[test]
    fn accepts_constant_return() {
        let body = check(returns_i32(), &[], &[op::I32_CONST, 42, op::END]).unwrap();
        assert_eq!(body.max_height, 1);
        assert!(body.side_table.is_empty());
    }

    #[test]
    fn rejects_operand_type_mismatch() {
        // i64.const 1; i32.const 2; i32.add
        let code = [op::I64_CONST, 1, op::I32_CONST, 2, op::I32_ADD, op::END];
        let err = check(returns_i32(), &[], &code).unwrap_err();
        assert_eq!(
            err.kind,
            Kind::TypeMismatch {
                expected: ValType::I32,
                found: ValType::I64
            }
        );
        assert_eq!(err.func, Some(0));
        assert_eq!(err.offset, Some(104));
    }

    #[test]
    fn rejects_underflow_and_leftovers() {
        assert_eq!(
            kind(check(returns_i32(), &[], &[op::I32_ADD, op::END])),
            Kind::StackUnderflow
        );
        assert_eq!(
            kind(check(FuncType::default(), &[], &[op::I32_CONST, 1, op::END])),
            Kind::UnbalancedStack {
                expected: 0,
                found: 1
            }
        );
        assert_eq!(
            kind(check(returns_i32(), &[], &[op::END])),
            Kind::UnbalancedStack {
                expected: 1,
                found: 0
            }
        );
    }

    #[test]
    fn block_cannot_pop_below_its_floor() {
        // i32.const 1; block; drop; end; drop
        let code = [op::I32_CONST, 1, op::BLOCK, 0x40, op::DROP, op::END, op::DROP, op::END];
        assert_eq!(kind(check(FuncType::default(), &[], &code)), Kind::StackUnderflow);
    }

    #[test]
    fn rejects_out_of_range_branch() {
        let code = [op::BLOCK, 0x40, op::BR, 2, op::END, op::END];
        assert_eq!(
            kind(check(FuncType::default(), &[], &code)),
            Kind::InvalidBranchDepth(2)
        );
    }

    #[test]
    fn unreachable_code_is_stack_polymorphic() {
        // unreachable; i32.add; end  (result i32)
        let code = [op::UNREACHABLE, op::I32_ADD, op::END];
        assert!(check(returns_i32(), &[], &code).is_ok());
        // i32.const 1; return; end
        let code = [op::I32_CONST, 1, op::RETURN, op::END];
        assert!(check(returns_i32(), &[], &code).is_ok());
        assert_eq!(
            kind(check(returns_i32(), &[], &[op::RETURN, op::END])),
            Kind::StackUnderflow
        );
        // unreachable; i64.const 0; end: a known value still has to match
        let code = [op::UNREACHABLE, op::I64_CONST, 0, op::END];
        assert!(matches!(
            kind(check(returns_i32(), &[], &code)),
            Kind::TypeMismatch { .. }
        ));
    }

    #[test]
    fn if_without_else_cannot_produce_a_value() {
        let code = [op::I32_CONST, 1, op::IF, 0x7F, op::I32_CONST, 2, op::END, op::END];
        assert_eq!(
            kind(check(returns_i32(), &[], &code)),
            Kind::UnbalancedStack {
                expected: 1,
                found: 0
            }
        );
    }

    #[test]
    fn if_else_side_table() {
        // 0: i32.const 1
        // 2: if (result i32)
        // 4:   i32.const 2
        // 6: else
        // 7:   i32.const 3
        // 9: end
        // 10: end
        let code = [
            op::I32_CONST, 1, op::IF, 0x7F, op::I32_CONST, 2, op::ELSE, op::I32_CONST, 3,
            op::END, op::END,
        ];
        let body = check(returns_i32(), &[], &code).unwrap();
        assert_eq!(body.side_table.get(2), Some(&Jump::If { else_pc: 7 }));
        assert_eq!(body.side_table.get(6), Some(&Jump::Else { end_pc: 9 }));
    }

    #[test]
    fn branch_targets_for_block_loop_and_function() {
        // 0: block
        // 2:   loop
        // 4:     br 1
        // 6:     br 0
        // 8:   end
        // 9: end
        // 10: br 0
        // 12: end
        let code = [
            op::BLOCK, 0x40, op::LOOP, 0x40, op::BR, 1, op::BR, 0, op::END, op::END, op::BR, 0,
            op::END,
        ];
        let body = check(FuncType::default(), &[], &code).unwrap();
        let target = |pc| match body.side_table.get(pc) {
            Some(Jump::Br(t)) => *t,
            other => panic!("no branch at {pc}: {other:?}"),
        };
        assert_eq!(target(4).pc, 9);
        assert_eq!(target(6).pc, 4);
        assert_eq!(target(10).pc, 12);
    }

    #[test]
    fn br_table_targets_share_arity() {
        // block (result i32); block; i32.const 0; i32.const 0; br_table 0 1; end; end
        let code = [
            op::BLOCK, 0x7F, op::BLOCK, 0x40, op::I32_CONST, 0, op::I32_CONST, 0, op::BR_TABLE,
            1, 0, 1, op::END, op::I32_CONST, 1, op::END, op::END,
        ];
        assert_eq!(
            kind(check(returns_i32(), &[], &code)),
            Kind::BranchArityMismatch
        );
    }

    #[test]
    fn locals_and_globals() {
        let locals = [LocalDecl {
            count: 1,
            val_type: ValType::I64,
        }];
        let code = [op::LOCAL_GET, 0, op::LOCAL_SET, 1, op::END];
        assert!(matches!(
            kind(check(FuncType::new(&[ValType::I32], &[]), &locals, &code)),
            Kind::TypeMismatch { .. }
        ));
        let code = [op::LOCAL_GET, 2, op::DROP, op::END];
        assert_eq!(
            kind(check(FuncType::new(&[ValType::I32], &[]), &locals, &code)),
            Kind::UnknownLocal(2)
        );

        let mut module = Module::default();
        module.globals.push(crate::model::GlobalEntry {
            ty: crate::model::GlobalType::new(ValType::I32, false),
            init: crate::model::ConstExpr::I32(0),
        });
        let code = [op::I32_CONST, 1, op::GLOBAL_SET, 0, op::END];
        assert_eq!(
            kind(check_in(module, FuncType::default(), &[], &code)),
            Kind::ImmutableGlobal(0)
        );
    }

    #[test]
    fn memory_access_requires_memory_and_sane_alignment() {
        let code = [op::I32_CONST, 0, op::I32_LOAD, 2, 0, op::END];
        assert_eq!(
            kind(check(returns_i32(), &[], &code)),
            Kind::UnknownMemory(0)
        );

        let mut module = Module::default();
        module.memories.push(MemoryType::default());
        assert!(check_in(module.clone(), returns_i32(), &[], &code).is_ok());
        let code = [op::I32_CONST, 0, op::I32_LOAD, 3, 0, op::END];
        assert_eq!(
            kind(check_in(module, returns_i32(), &[], &code)),
            Kind::InvalidAlignment {
                align: 3,
                natural: 2
            }
        );
    }

    #[test]
    fn body_structure() {
        assert_eq!(
            kind(check(FuncType::default(), &[], &[op::NOP])),
            Kind::Malformed("missing final end")
        );
        assert_eq!(
            kind(check(FuncType::default(), &[], &[op::END, op::NOP])),
            Kind::Malformed("instructions after the final end")
        );
        assert_eq!(
            kind(check(FuncType::default(), &[], &[0xFC, op::END])),
            Kind::InvalidOpcode(0xFC)
        );
        assert_eq!(
            kind(check(FuncType::default(), &[], &[op::BLOCK, 0x00, op::END, op::END])),
            Kind::UnsupportedBlockType(0x00)
        );
    }
}
