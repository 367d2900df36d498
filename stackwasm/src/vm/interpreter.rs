//! Dispatch loop.
//!
//! Runs validated code only: immediates are decoded with the non-checking readers from
//! [`super::instructions`], operands are read as raw slots, and every structured jump comes
//! from the function's [`SideTable`]. What validation cannot rule out (memory and table bounds,
//! arithmetic faults, resource limits) surfaces as a [`Trap`].

use tracing::trace;

use super::frames::Frame;
use super::instructions::{
    op, read_f32_bits, read_f64_bits, read_i32, read_i64, read_memarg, read_u32,
};
use super::numeric::{self, sign};
use super::Vm;
use crate::debug::ExecutionView;
use crate::error::Trap;
use crate::host::HostFunc;
use crate::model::{FuncIdx, FuncKind, FuncType, Value};
use crate::runtime::Memory;
use crate::validate::{BranchTarget, Jump, SideTable, ValidatedModule};

#[inline]
fn i32_of(v: u64) -> i32 {
    v as u32 as i32
}
#[inline]
fn u32_of(v: u64) -> u32 {
    v as u32
}
#[inline]
fn i64_of(v: u64) -> i64 {
    v as i64
}
#[inline]
fn u64_of(v: u64) -> u64 {
    v
}
#[inline]
fn f32_of(v: u64) -> f32 {
    f32::from_bits(v as u32)
}
#[inline]
fn f64_of(v: u64) -> f64 {
    f64::from_bits(v)
}
#[inline]
fn from_i32(v: i32) -> u64 {
    v as u32 as u64
}
#[inline]
fn from_u32(v: u32) -> u64 {
    v as u64
}
#[inline]
fn from_i64(v: i64) -> u64 {
    v as u64
}
#[inline]
fn from_u64(v: u64) -> u64 {
    v
}
#[inline]
fn from_f32(v: f32) -> u64 {
    v.to_bits() as u64
}
#[inline]
fn from_f64(v: f64) -> u64 {
    v.to_bits()
}
#[inline]
fn from_bool(v: bool) -> u64 {
    v as u64
}

macro_rules! unop {
    ($s:expr, $get:ident, $put:ident, |$a:ident| $e:expr) => {{
        let $a = $get($s.pop());
        $s.push($put($e));
    }};
}

macro_rules! binop {
    ($s:expr, $get:ident, $put:ident, |$a:ident, $b:ident| $e:expr) => {{
        let $b = $get($s.pop());
        let $a = $get($s.pop());
        $s.push($put($e));
    }};
}

macro_rules! load {
    ($vm:ident, $code:ident, $pc:ident, $n:literal, |$bytes:ident| $e:expr) => {{
        let offset = read_memarg($code, &mut $pc);
        let addr = u32_of($vm.stack.pop());
        let $bytes: [u8; $n] = memory(&$vm.memory)?.load(addr, offset)?;
        $vm.stack.push($e);
    }};
}

macro_rules! store {
    ($vm:ident, $code:ident, $pc:ident, |$v:ident| $bytes:expr) => {{
        let offset = read_memarg($code, &mut $pc);
        let $v = $vm.stack.pop();
        let addr = u32_of($vm.stack.pop());
        memory_mut(&mut $vm.memory)?.store(addr, offset, $bytes)?;
    }};
}

#[inline]
fn memory(memory: &Option<Memory>) -> Result<&Memory, Trap> {
    memory.as_ref().ok_or(Trap::MemoryOutOfBounds)
}

#[inline]
fn memory_mut(memory: &mut Option<Memory>) -> Result<&mut Memory, Trap> {
    memory.as_mut().ok_or(Trap::MemoryOutOfBounds)
}

#[cold]
fn missing_jump(pc: usize) -> ! {
    unreachable!("validated branch at {pc} has no side-table entry")
}

#[inline]
fn jump(side: &SideTable, pc: usize) -> &Jump {
    match side.get(pc) {
        Some(jump) => jump,
        None => missing_jump(pc),
    }
}

impl Vm {
    /// Run `func` with its arguments already pushed. On success its results replace them.
    pub(super) fn run(&mut self, func: FuncIdx) -> Result<(), Trap> {
        let validated = self.module.clone();
        let stop = self.frames.len();
        self.call(&validated, func)?;
        if self.frames.len() > stop {
            self.execute(&validated, stop)?;
        }
        Ok(())
    }

    /// Push a frame for a defined function, or run an imported one to completion.
    fn call(&mut self, validated: &ValidatedModule, func: FuncIdx) -> Result<(), Trap> {
        let module = validated.module();
        let f = &module.functions[func as usize];
        let ty = &module.types[f.type_idx as usize];
        match &f.kind {
            FuncKind::Defined { body } => self.enter(validated, func, *body, ty),
            FuncKind::Host(host) => self.call_host(&**host, ty),
            FuncKind::Imported { .. } => self.call_linked(func, ty),
        }
    }

    fn enter(
        &mut self,
        validated: &ValidatedModule,
        func: FuncIdx,
        body: usize,
        ty: &FuncType,
    ) -> Result<(), Trap> {
        if self.depth_base + self.frames.len() >= self.config.max_call_depth {
            return Err(Trap::CallStackExhausted);
        }
        let compiled = &validated.bodies()[body];
        let num_locals = compiled.num_locals as usize;
        self.stack
            .reserve(num_locals + compiled.max_height as usize)?;
        let locals = self.stack.len() - ty.params.len();
        self.stack.push_zeros(num_locals);
        self.frames.push(Frame {
            func,
            body,
            pc: 0,
            locals,
            base: self.stack.len(),
            arity: ty.results.len(),
        });
        trace!(func, depth = self.frames.len(), "enter");
        Ok(())
    }

    #[inline]
    fn leave(&mut self, frame: Frame) {
        self.frames.pop();
        self.stack.unwind(frame.locals, frame.arity);
        trace!(func = frame.func, depth = self.frames.len(), "leave");
    }

    #[inline]
    fn branch(&mut self, base: usize, target: &BranchTarget) -> usize {
        self.stack
            .unwind(base + target.height as usize, target.arity as usize);
        target.pc as usize
    }

    #[inline]
    fn save_pc(&mut self, pc: usize) {
        if let Some(frame) = self.frames.last_mut() {
            frame.pc = pc;
        }
    }

    fn call_host(&mut self, host: &HostFunc, ty: &FuncType) -> Result<(), Trap> {
        let start = self.stack.len() - ty.params.len();
        let args: Vec<Value> = ty
            .params
            .iter()
            .zip(self.stack.slice_from(start))
            .map(|(&t, &bits)| Value::from_bits(t, bits))
            .collect();
        self.stack.truncate(start);
        match (host(&args)?, ty.results.first()) {
            (None, None) => {}
            (Some(v), Some(&t)) if v.ty() == t => self.stack.push(v.to_bits()),
            (got, _) => {
                return Err(Trap::Host(format!(
                    "host function returned {got:?}, declared {ty}"
                )))
            }
        }
        Ok(())
    }

    /// Call a function defined by another module inside that module's own instance.
    fn call_linked(&mut self, func: FuncIdx, ty: &FuncType) -> Result<(), Trap> {
        let Some((slot, index)) = self.links.get(func as usize).copied().flatten() else {
            return Err(Trap::Internal(format!("function {func} is not linked")));
        };
        let start = self.stack.len() - ty.params.len();
        let depth = self.depth_base + self.frames.len();
        let child = &mut self.children[slot];
        child.fuel = self.fuel;
        child.depth_base = depth;
        let result = child.call_raw(index, self.stack.slice_from(start));
        self.fuel = child.fuel;
        let result = result?;
        self.stack.truncate(start);
        if let Some(bits) = result {
            self.stack.push(bits);
        }
        Ok(())
    }

    fn execute(&mut self, validated: &ValidatedModule, stop: usize) -> Result<(), Trap> {
        let module = validated.module();
        let bodies = validated.bodies();

        'frames: loop {
            let Some(&frame) = self.frames.last() else {
                return Ok(());
            };
            let code: &[u8] = &module.bodies[frame.body].code;
            let side = &bodies[frame.body].side_table;
            let mut pc = frame.pc;

            loop {
                if let Some(fuel) = self.fuel.as_mut() {
                    if *fuel == 0 {
                        return Err(Trap::OutOfFuel);
                    }
                    *fuel -= 1;
                }
                if let Some(hook) = self.debug.as_mut() {
                    if hook.is_breakpoint(pc) {
                        let slots = self.stack.as_slice();
                        hook.on_break(&ExecutionView {
                            func: frame.func,
                            pc,
                            locals: &slots[frame.locals..frame.base],
                            stack: &slots[frame.base..],
                        });
                    }
                }

                let at = pc;
                let opcode = code[pc];
                pc += 1;

                match opcode {
                    op::UNREACHABLE => return Err(Trap::Unreachable),
                    op::NOP => {}
                    op::BLOCK | op::LOOP => pc += 1,
                    op::IF => {
                        if u32_of(self.stack.pop()) != 0 {
                            pc += 1;
                        } else {
                            match jump(side, at) {
                                Jump::If { else_pc } => pc = *else_pc as usize,
                                _ => missing_jump(at),
                            }
                        }
                    }
                    op::ELSE => match jump(side, at) {
                        Jump::Else { end_pc } => pc = *end_pc as usize,
                        _ => missing_jump(at),
                    },
                    op::END => {
                        if pc == code.len() {
                            self.leave(frame);
                            if self.frames.len() == stop {
                                return Ok(());
                            }
                            continue 'frames;
                        }
                    }
                    op::BR => match jump(side, at) {
                        Jump::Br(target) => pc = self.branch(frame.base, target),
                        _ => missing_jump(at),
                    },
                    op::BR_IF => {
                        if u32_of(self.stack.pop()) != 0 {
                            match jump(side, at) {
                                Jump::Br(target) => pc = self.branch(frame.base, target),
                                _ => missing_jump(at),
                            }
                        } else {
                            read_u32(code, &mut pc);
                        }
                    }
                    op::BR_TABLE => {
                        let index = u32_of(self.stack.pop()) as usize;
                        match jump(side, at) {
                            Jump::BrTable(targets) => {
                                // the default target is last
                                let target = &targets[index.min(targets.len() - 1)];
                                pc = self.branch(frame.base, target);
                            }
                            _ => missing_jump(at),
                        }
                    }
                    op::RETURN => {
                        self.leave(frame);
                        if self.frames.len() == stop {
                            return Ok(());
                        }
                        continue 'frames;
                    }

                    op::CALL => {
                        let callee = read_u32(code, &mut pc);
                        self.save_pc(pc);
                        self.call(validated, callee)?;
                        continue 'frames;
                    }
                    op::CALL_INDIRECT => {
                        let type_idx = read_u32(code, &mut pc);
                        pc += 1;
                        let slot = u32_of(self.stack.pop());
                        let callee = self
                            .table
                            .as_ref()
                            .ok_or(Trap::TableOutOfBounds)?
                            .get(slot)?;
                        let expected = module.types.get(type_idx as usize);
                        if module.func_type(callee) != expected {
                            return Err(Trap::IndirectCallTypeMismatch);
                        }
                        self.save_pc(pc);
                        self.call(validated, callee)?;
                        continue 'frames;
                    }

                    op::DROP => {
                        self.stack.pop();
                    }
                    op::SELECT => {
                        let cond = u32_of(self.stack.pop());
                        let b = self.stack.pop();
                        let a = self.stack.pop();
                        self.stack.push(if cond != 0 { a } else { b });
                    }

                    op::LOCAL_GET => {
                        let index = read_u32(code, &mut pc);
                        let v = self.stack.get(frame.local_slot(index));
                        self.stack.push(v);
                    }
                    op::LOCAL_SET => {
                        let index = read_u32(code, &mut pc);
                        let v = self.stack.pop();
                        self.stack.set(frame.local_slot(index), v);
                    }
                    op::LOCAL_TEE => {
                        let index = read_u32(code, &mut pc);
                        let v = self.stack.top();
                        self.stack.set(frame.local_slot(index), v);
                    }
                    op::GLOBAL_GET => {
                        let index = read_u32(code, &mut pc) as usize;
                        self.stack.push(self.globals[index]);
                    }
                    op::GLOBAL_SET => {
                        let index = read_u32(code, &mut pc) as usize;
                        self.globals[index] = self.stack.pop();
                    }

                    op::I32_LOAD => load!(self, code, pc, 4, |b| from_u32(u32::from_le_bytes(b))),
                    op::I64_LOAD => load!(self, code, pc, 8, |b| u64::from_le_bytes(b)),
                    op::F32_LOAD => load!(self, code, pc, 4, |b| from_u32(u32::from_le_bytes(b))),
                    op::F64_LOAD => load!(self, code, pc, 8, |b| u64::from_le_bytes(b)),
                    op::I32_LOAD8_S => {
                        load!(self, code, pc, 1, |b| from_i32(i8::from_le_bytes(b) as i32))
                    }
                    op::I32_LOAD8_U => load!(self, code, pc, 1, |b| from_u32(b[0] as u32)),
                    op::I32_LOAD16_S => {
                        load!(self, code, pc, 2, |b| from_i32(i16::from_le_bytes(b) as i32))
                    }
                    op::I32_LOAD16_U => {
                        load!(self, code, pc, 2, |b| from_u32(u16::from_le_bytes(b) as u32))
                    }
                    op::I64_LOAD8_S => {
                        load!(self, code, pc, 1, |b| from_i64(i8::from_le_bytes(b) as i64))
                    }
                    op::I64_LOAD8_U => load!(self, code, pc, 1, |b| b[0] as u64),
                    op::I64_LOAD16_S => {
                        load!(self, code, pc, 2, |b| from_i64(i16::from_le_bytes(b) as i64))
                    }
                    op::I64_LOAD16_U => load!(self, code, pc, 2, |b| u16::from_le_bytes(b) as u64),
                    op::I64_LOAD32_S => {
                        load!(self, code, pc, 4, |b| from_i64(i32::from_le_bytes(b) as i64))
                    }
                    op::I64_LOAD32_U => load!(self, code, pc, 4, |b| u32::from_le_bytes(b) as u64),

                    op::I32_STORE | op::F32_STORE => {
                        store!(self, code, pc, |v| (v as u32).to_le_bytes())
                    }
                    op::I64_STORE | op::F64_STORE => store!(self, code, pc, |v| v.to_le_bytes()),
                    op::I32_STORE8 | op::I64_STORE8 => {
                        store!(self, code, pc, |v| (v as u8).to_le_bytes())
                    }
                    op::I32_STORE16 | op::I64_STORE16 => {
                        store!(self, code, pc, |v| (v as u16).to_le_bytes())
                    }
                    op::I64_STORE32 => store!(self, code, pc, |v| (v as u32).to_le_bytes()),

                    op::MEMORY_SIZE => {
                        pc += 1;
                        let pages = memory(&self.memory)?.size_pages();
                        self.stack.push(from_u32(pages));
                    }
                    op::MEMORY_GROW => {
                        pc += 1;
                        let delta = u32_of(self.stack.pop());
                        let prev = memory_mut(&mut self.memory)?
                            .grow(delta)
                            .map_or(-1, |p| p as i32);
                        self.stack.push(from_i32(prev));
                    }

                    op::I32_CONST => {
                        let v = read_i32(code, &mut pc);
                        self.stack.push(from_i32(v));
                    }
                    op::I64_CONST => {
                        let v = read_i64(code, &mut pc);
                        self.stack.push(from_i64(v));
                    }
                    op::F32_CONST => {
                        let bits = read_f32_bits(code, &mut pc);
                        self.stack.push(from_u32(bits));
                    }
                    op::F64_CONST => {
                        let bits = read_f64_bits(code, &mut pc);
                        self.stack.push(bits);
                    }

                    op::I32_EQZ => unop!(self.stack, u32_of, from_bool, |a| a == 0),
                    op::I32_EQ => binop!(self.stack, u32_of, from_bool, |a, b| a == b),
                    op::I32_NE => binop!(self.stack, u32_of, from_bool, |a, b| a != b),
                    op::I32_LT_S => binop!(self.stack, i32_of, from_bool, |a, b| a < b),
                    op::I32_LT_U => binop!(self.stack, u32_of, from_bool, |a, b| a < b),
                    op::I32_GT_S => binop!(self.stack, i32_of, from_bool, |a, b| a > b),
                    op::I32_GT_U => binop!(self.stack, u32_of, from_bool, |a, b| a > b),
                    op::I32_LE_S => binop!(self.stack, i32_of, from_bool, |a, b| a <= b),
                    op::I32_LE_U => binop!(self.stack, u32_of, from_bool, |a, b| a <= b),
                    op::I32_GE_S => binop!(self.stack, i32_of, from_bool, |a, b| a >= b),
                    op::I32_GE_U => binop!(self.stack, u32_of, from_bool, |a, b| a >= b),

                    op::I64_EQZ => unop!(self.stack, u64_of, from_bool, |a| a == 0),
                    op::I64_EQ => binop!(self.stack, u64_of, from_bool, |a, b| a == b),
                    op::I64_NE => binop!(self.stack, u64_of, from_bool, |a, b| a != b),
                    op::I64_LT_S => binop!(self.stack, i64_of, from_bool, |a, b| a < b),
                    op::I64_LT_U => binop!(self.stack, u64_of, from_bool, |a, b| a < b),
                    op::I64_GT_S => binop!(self.stack, i64_of, from_bool, |a, b| a > b),
                    op::I64_GT_U => binop!(self.stack, u64_of, from_bool, |a, b| a > b),
                    op::I64_LE_S => binop!(self.stack, i64_of, from_bool, |a, b| a <= b),
                    op::I64_LE_U => binop!(self.stack, u64_of, from_bool, |a, b| a <= b),
                    op::I64_GE_S => binop!(self.stack, i64_of, from_bool, |a, b| a >= b),
                    op::I64_GE_U => binop!(self.stack, u64_of, from_bool, |a, b| a >= b),

                    op::F32_EQ => binop!(self.stack, f32_of, from_bool, |a, b| a == b),
                    op::F32_NE => binop!(self.stack, f32_of, from_bool, |a, b| a != b),
                    op::F32_LT => binop!(self.stack, f32_of, from_bool, |a, b| a < b),
                    op::F32_GT => binop!(self.stack, f32_of, from_bool, |a, b| a > b),
                    op::F32_LE => binop!(self.stack, f32_of, from_bool, |a, b| a <= b),
                    op::F32_GE => binop!(self.stack, f32_of, from_bool, |a, b| a >= b),

                    op::F64_EQ => binop!(self.stack, f64_of, from_bool, |a, b| a == b),
                    op::F64_NE => binop!(self.stack, f64_of, from_bool, |a, b| a != b),
                    op::F64_LT => binop!(self.stack, f64_of, from_bool, |a, b| a < b),
                    op::F64_GT => binop!(self.stack, f64_of, from_bool, |a, b| a > b),
                    op::F64_LE => binop!(self.stack, f64_of, from_bool, |a, b| a <= b),
                    op::F64_GE => binop!(self.stack, f64_of, from_bool, |a, b| a >= b),

                    op::I32_CLZ => unop!(self.stack, u32_of, from_u32, |a| a.leading_zeros()),
                    op::I32_CTZ => unop!(self.stack, u32_of, from_u32, |a| a.trailing_zeros()),
                    op::I32_POPCNT => unop!(self.stack, u32_of, from_u32, |a| a.count_ones()),
                    op::I32_ADD => binop!(self.stack, i32_of, from_i32, |a, b| a.wrapping_add(b)),
                    op::I32_SUB => binop!(self.stack, i32_of, from_i32, |a, b| a.wrapping_sub(b)),
                    op::I32_MUL => binop!(self.stack, i32_of, from_i32, |a, b| a.wrapping_mul(b)),
                    op::I32_DIV_S => {
                        binop!(self.stack, i32_of, from_i32, |a, b| numeric::i32_div_s(a, b)?)
                    }
                    op::I32_DIV_U => {
                        binop!(self.stack, u32_of, from_u32, |a, b| numeric::i32_div_u(a, b)?)
                    }
                    op::I32_REM_S => {
                        binop!(self.stack, i32_of, from_i32, |a, b| numeric::i32_rem_s(a, b)?)
                    }
                    op::I32_REM_U => {
                        binop!(self.stack, u32_of, from_u32, |a, b| numeric::i32_rem_u(a, b)?)
                    }
                    op::I32_AND => binop!(self.stack, u32_of, from_u32, |a, b| a & b),
                    op::I32_OR => binop!(self.stack, u32_of, from_u32, |a, b| a | b),
                    op::I32_XOR => binop!(self.stack, u32_of, from_u32, |a, b| a ^ b),
                    op::I32_SHL => binop!(self.stack, u32_of, from_u32, |a, b| a.wrapping_shl(b)),
                    op::I32_SHR_S => {
                        binop!(self.stack, i32_of, from_i32, |a, b| a.wrapping_shr(b as u32))
                    }
                    op::I32_SHR_U => {
                        binop!(self.stack, u32_of, from_u32, |a, b| a.wrapping_shr(b))
                    }
                    op::I32_ROTL => {
                        binop!(self.stack, u32_of, from_u32, |a, b| a.rotate_left(b % 32))
                    }
                    op::I32_ROTR => {
                        binop!(self.stack, u32_of, from_u32, |a, b| a.rotate_right(b % 32))
                    }

                    op::I64_CLZ => {
                        unop!(self.stack, u64_of, from_u64, |a| a.leading_zeros() as u64)
                    }
                    op::I64_CTZ => {
                        unop!(self.stack, u64_of, from_u64, |a| a.trailing_zeros() as u64)
                    }
                    op::I64_POPCNT => {
                        unop!(self.stack, u64_of, from_u64, |a| a.count_ones() as u64)
                    }
                    op::I64_ADD => binop!(self.stack, u64_of, from_u64, |a, b| a.wrapping_add(b)),
                    op::I64_SUB => binop!(self.stack, u64_of, from_u64, |a, b| a.wrapping_sub(b)),
                    op::I64_MUL => binop!(self.stack, u64_of, from_u64, |a, b| a.wrapping_mul(b)),
                    op::I64_DIV_S => {
                        binop!(self.stack, i64_of, from_i64, |a, b| numeric::i64_div_s(a, b)?)
                    }
                    op::I64_DIV_U => {
                        binop!(self.stack, u64_of, from_u64, |a, b| numeric::i64_div_u(a, b)?)
                    }
                    op::I64_REM_S => {
                        binop!(self.stack, i64_of, from_i64, |a, b| numeric::i64_rem_s(a, b)?)
                    }
                    op::I64_REM_U => {
                        binop!(self.stack, u64_of, from_u64, |a, b| numeric::i64_rem_u(a, b)?)
                    }
                    op::I64_AND => binop!(self.stack, u64_of, from_u64, |a, b| a & b),
                    op::I64_OR => binop!(self.stack, u64_of, from_u64, |a, b| a | b),
                    op::I64_XOR => binop!(self.stack, u64_of, from_u64, |a, b| a ^ b),
                    op::I64_SHL => {
                        binop!(self.stack, u64_of, from_u64, |a, b| a.wrapping_shl(b as u32))
                    }
                    op::I64_SHR_S => {
                        binop!(self.stack, i64_of, from_i64, |a, b| a.wrapping_shr(b as u32))
                    }
                    op::I64_SHR_U => {
                        binop!(self.stack, u64_of, from_u64, |a, b| a.wrapping_shr(b as u32))
                    }
                    op::I64_ROTL => {
                        binop!(self.stack, u64_of, from_u64, |a, b| a.rotate_left((b % 64) as u32))
                    }
                    op::I64_ROTR => {
                        binop!(self.stack, u64_of, from_u64, |a, b| a.rotate_right((b % 64) as u32))
                    }

                    op::F32_ABS => unop!(self.stack, u32_of, from_u32, |a| a & !sign::F32_SIGN),
                    op::F32_NEG => unop!(self.stack, u32_of, from_u32, |a| a ^ sign::F32_SIGN),
                    op::F32_CEIL => unop!(self.stack, f32_of, from_f32, |a| a.ceil()),
                    op::F32_FLOOR => unop!(self.stack, f32_of, from_f32, |a| a.floor()),
                    op::F32_TRUNC => unop!(self.stack, f32_of, from_f32, |a| a.trunc()),
                    op::F32_NEAREST => unop!(self.stack, f32_of, from_f32, |a| a.round_ties_even()),
                    op::F32_SQRT => unop!(self.stack, f32_of, from_f32, |a| a.sqrt()),
                    op::F32_ADD => binop!(self.stack, f32_of, from_f32, |a, b| a + b),
                    op::F32_SUB => binop!(self.stack, f32_of, from_f32, |a, b| a - b),
                    op::F32_MUL => binop!(self.stack, f32_of, from_f32, |a, b| a * b),
                    op::F32_DIV => binop!(self.stack, f32_of, from_f32, |a, b| a / b),
                    op::F32_MIN => binop!(self.stack, f32_of, from_f32, |a, b| numeric::f32_min(a, b)),
                    op::F32_MAX => binop!(self.stack, f32_of, from_f32, |a, b| numeric::f32_max(a, b)),
                    op::F32_COPYSIGN => {
                        binop!(self.stack, u32_of, from_u32, |a, b| sign::f32_copysign(a, b))
                    }

                    op::F64_ABS => unop!(self.stack, u64_of, from_u64, |a| a & !sign::F64_SIGN),
                    op::F64_NEG => unop!(self.stack, u64_of, from_u64, |a| a ^ sign::F64_SIGN),
                    op::F64_CEIL => unop!(self.stack, f64_of, from_f64, |a| a.ceil()),
                    op::F64_FLOOR => unop!(self.stack, f64_of, from_f64, |a| a.floor()),
                    op::F64_TRUNC => unop!(self.stack, f64_of, from_f64, |a| a.trunc()),
                    op::F64_NEAREST => unop!(self.stack, f64_of, from_f64, |a| a.round_ties_even()),
                    op::F64_SQRT => unop!(self.stack, f64_of, from_f64, |a| a.sqrt()),
                    op::F64_ADD => binop!(self.stack, f64_of, from_f64, |a, b| a + b),
                    op::F64_SUB => binop!(self.stack, f64_of, from_f64, |a, b| a - b),
                    op::F64_MUL => binop!(self.stack, f64_of, from_f64, |a, b| a * b),
                    op::F64_DIV => binop!(self.stack, f64_of, from_f64, |a, b| a / b),
                    op::F64_MIN => binop!(self.stack, f64_of, from_f64, |a, b| numeric::f64_min(a, b)),
                    op::F64_MAX => binop!(self.stack, f64_of, from_f64, |a, b| numeric::f64_max(a, b)),
                    op::F64_COPYSIGN => {
                        binop!(self.stack, u64_of, from_u64, |a, b| sign::f64_copysign(a, b))
                    }

                    op::I32_WRAP_I64 => unop!(self.stack, u64_of, from_u32, |a| a as u32),
                    op::I32_TRUNC_F32_S => {
                        unop!(self.stack, f32_of, from_i32, |a| numeric::trunc_i32(a as f64)?)
                    }
                    op::I32_TRUNC_F32_U => {
                        unop!(self.stack, f32_of, from_u32, |a| numeric::trunc_u32(a as f64)?)
                    }
                    op::I32_TRUNC_F64_S => {
                        unop!(self.stack, f64_of, from_i32, |a| numeric::trunc_i32(a)?)
                    }
                    op::I32_TRUNC_F64_U => {
                        unop!(self.stack, f64_of, from_u32, |a| numeric::trunc_u32(a)?)
                    }
                    op::I64_EXTEND_I32_S => unop!(self.stack, i32_of, from_i64, |a| a as i64),
                    op::I64_EXTEND_I32_U => unop!(self.stack, u32_of, from_u64, |a| a as u64),
                    op::I64_TRUNC_F32_S => {
                        unop!(self.stack, f32_of, from_i64, |a| numeric::trunc_i64(a as f64)?)
                    }
                    op::I64_TRUNC_F32_U => {
                        unop!(self.stack, f32_of, from_u64, |a| numeric::trunc_u64(a as f64)?)
                    }
                    op::I64_TRUNC_F64_S => {
                        unop!(self.stack, f64_of, from_i64, |a| numeric::trunc_i64(a)?)
                    }
                    op::I64_TRUNC_F64_U => {
                        unop!(self.stack, f64_of, from_u64, |a| numeric::trunc_u64(a)?)
                    }
                    op::F32_CONVERT_I32_S => unop!(self.stack, i32_of, from_f32, |a| a as f32),
                    op::F32_CONVERT_I32_U => unop!(self.stack, u32_of, from_f32, |a| a as f32),
                    op::F32_CONVERT_I64_S => unop!(self.stack, i64_of, from_f32, |a| a as f32),
                    op::F32_CONVERT_I64_U => unop!(self.stack, u64_of, from_f32, |a| a as f32),
                    op::F32_DEMOTE_F64 => unop!(self.stack, f64_of, from_f32, |a| a as f32),
                    op::F64_CONVERT_I32_S => unop!(self.stack, i32_of, from_f64, |a| a as f64),
                    op::F64_CONVERT_I32_U => unop!(self.stack, u32_of, from_f64, |a| a as f64),
                    op::F64_CONVERT_I64_S => unop!(self.stack, i64_of, from_f64, |a| a as f64),
                    op::F64_CONVERT_I64_U => unop!(self.stack, u64_of, from_f64, |a| a as f64),
                    op::F64_PROMOTE_F32 => unop!(self.stack, f32_of, from_f64, |a| a as f64),

                    // Slots hold raw bits with 32-bit values zero-extended, so reinterpretation
                    // leaves the stack untouched.
                    op::I32_REINTERPRET_F32
                    | op::I64_REINTERPRET_F64
                    | op::F32_REINTERPRET_I32
                    | op::F64_REINTERPRET_I64 => {}

                    other => {
                        return Err(Trap::Internal(format!(
                            "opcode {other:#04x} at {at} passed validation but is not executable"
                        )))
                    }
                }
            }
        }
    }
}
