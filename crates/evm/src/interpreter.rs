//! The execution loop: fetch, price, execute, advance.

use crate::{
    gas::{self, Gas},
    opcode, precompile, BlockEnv, CallKind, Execution, Host, Memory, Message, Stack, VmError,
};
use alloy_primitives::{keccak256, Address, Bytes, B256, U256};
use ember_genesis::Fork;
use ember_primitives::{Log, EMPTY_CODE_HASH};

/// The call-stack depth bound.
pub const CALL_DEPTH_LIMIT: usize = 1024;

/// The virtual machine, bound to a state host, a block context, and the fork
/// rules in force.
#[derive(Debug)]
pub struct Evm<'a, H: Host + ?Sized> {
    pub(crate) host: &'a mut H,
    pub(crate) block: &'a BlockEnv,
    pub(crate) fork: Fork,
}

impl<'a, H: Host + ?Sized> Evm<'a, H> {
    /// Binds a machine to its environment.
    pub fn new(host: &'a mut H, block: &'a BlockEnv, fork: Fork) -> Self {
        Self { host, block, fork }
    }

    /// The fork rules in force.
    pub const fn fork(&self) -> Fork {
        self.fork
    }

    /// Executes one message frame to completion, journaling state so that a
    /// revert or fault unwinds every effect of the frame and its children.
    pub fn execute(&mut self, msg: Message) -> Execution {
        if msg.depth > CALL_DEPTH_LIMIT {
            return Execution::failure(VmError::CallDepth);
        }

        let snapshot = self.host.snapshot();
        let result = self.execute_inner(&msg);
        if !result.status.is_success() {
            self.host.revert_to(snapshot);
        }
        result
    }

    fn execute_inner(&mut self, msg: &Message) -> Execution {
        // Frame setup: account liveness and value movement.
        match msg.kind {
            CallKind::Call | CallKind::StaticCall => {
                self.host.touch(msg.address);
                if !msg.value.is_zero() && !self.host.transfer(msg.caller, msg.address, msg.value)
                {
                    return Execution::failure(VmError::OutOfGas);
                }
            }
            CallKind::Create | CallKind::Create2 { .. } => {
                self.host.touch(msg.address);
                if self.fork.at_least(Fork::SpuriousDragon) {
                    // EIP-161: contracts begin life at nonce one.
                    self.host.increment_nonce(msg.address);
                }
                if !msg.value.is_zero() && !self.host.transfer(msg.caller, msg.address, msg.value)
                {
                    return Execution::failure(VmError::OutOfGas);
                }
            }
            // CALLCODE and DELEGATECALL run foreign code against the local
            // account; no value moves.
            CallKind::CallCode | CallKind::DelegateCall => {}
        }

        if precompile::is_precompile(msg.code_address, self.fork) && !msg.kind.is_create() {
            return precompile::execute(msg.code_address, &msg.input, msg.gas, self.fork);
        }

        let mut result = self.run_frame(msg);
        if msg.kind.is_create() && result.status.is_success() {
            result = self.deposit_code(msg.address, result);
        }
        result
    }

    /// Charges the code-deposit cost and installs the returned runtime code.
    fn deposit_code(&mut self, address: Address, result: Execution) -> Execution {
        let code = result.output.clone();
        if self.fork.at_least(Fork::SpuriousDragon) && code.len() > gas::MAX_CODE_SIZE {
            return Execution::failure(VmError::CodeSizeLimit);
        }

        let deposit_cost = code.len() as u64 * gas::CREATE_DATA_GAS;
        if deposit_cost > result.gas_left {
            // Frontier tolerated an unpaid deposit and kept the empty code;
            // Homestead made it a failure.
            if self.fork.at_least(Fork::Homestead) {
                return Execution::failure(VmError::OutOfGas);
            }
            return Execution::success(result.gas_left, Bytes::new());
        }

        self.host.set_code(address, code);
        Execution::success(result.gas_left - deposit_cost, result.output)
    }

    /// The fetch-price-execute loop for one frame.
    #[allow(clippy::too_many_lines)]
    fn run_frame(&mut self, msg: &Message) -> Execution {
        let code: &[u8] = &msg.code;
        if code.is_empty() {
            return Execution::success(msg.gas, Bytes::new());
        }

        let jumpdests = opcode::jumpdest_bitmap(code);
        let mut stack = Stack::new();
        let mut memory = Memory::new();
        let mut gas = Gas::new(msg.gas);
        let mut returndata = Bytes::new();
        let mut pc = 0usize;

        loop {
            // Running off the end of the code is an implicit STOP.
            let Some(&op) = code.get(pc) else {
                return Execution::success(gas.remaining(), Bytes::new());
            };

            let Some(base_cost) = opcode::static_gas(op, self.fork) else {
                return Execution::failure(VmError::InvalidOpcode(op));
            };
            if let Err(err) = gas.charge(base_cost) {
                return Execution::failure(err);
            }

            let outcome =
                self.step(op, msg, &mut pc, &mut stack, &mut memory, &mut gas, &mut returndata, &jumpdests);
            match outcome {
                Ok(None) => {}
                Ok(Some(halt)) => return halt,
                Err(err) => return Execution::failure(err),
            }
        }
    }

    /// Executes one instruction. Returns `Some` when the frame halts.
    #[allow(clippy::too_many_arguments, clippy::too_many_lines)]
    fn step(
        &mut self,
        op: u8,
        msg: &Message,
        pc: &mut usize,
        stack: &mut Stack,
        memory: &mut Memory,
        gas: &mut Gas,
        returndata: &mut Bytes,
        jumpdests: &[bool],
    ) -> Result<Option<Execution>, VmError> {
        use opcode::*;

        match op {
            STOP => return Ok(Some(Execution::success(gas.remaining(), Bytes::new()))),

            // Arithmetic.
            ADD => binary_op(stack, |a, b| a.wrapping_add(b))?,
            MUL => binary_op(stack, |a, b| a.wrapping_mul(b))?,
            SUB => binary_op(stack, |a, b| a.wrapping_sub(b))?,
            DIV => binary_op(stack, |a, b| a.checked_div(b).unwrap_or_default())?,
            SDIV => binary_op(stack, sdiv)?,
            MOD => binary_op(stack, |a, b| a.checked_rem(b).unwrap_or_default())?,
            SMOD => binary_op(stack, smod)?,
            ADDMOD => {
                let (a, b, m) = (stack.pop()?, stack.pop()?, stack.pop()?);
                stack.push(if m.is_zero() { U256::ZERO } else { a.add_mod(b, m) })?;
            }
            MULMOD => {
                let (a, b, m) = (stack.pop()?, stack.pop()?, stack.pop()?);
                stack.push(if m.is_zero() { U256::ZERO } else { a.mul_mod(b, m) })?;
            }
            EXP => {
                let (base, exponent) = (stack.pop()?, stack.pop()?);
                let byte_length = exponent.bit_len().div_ceil(8) as u64;
                gas.charge(byte_length * opcode::exp_byte_cost(self.fork))?;
                stack.push(base.wrapping_pow(exponent))?;
            }
            SIGNEXTEND => binary_op(stack, signextend)?,

            // Comparison and bitwise.
            LT => binary_op(stack, |a, b| U256::from(a < b))?,
            GT => binary_op(stack, |a, b| U256::from(a > b))?,
            SLT => binary_op(stack, |a, b| U256::from(flip_sign(a) < flip_sign(b)))?,
            SGT => binary_op(stack, |a, b| U256::from(flip_sign(a) > flip_sign(b)))?,
            EQ => binary_op(stack, |a, b| U256::from(a == b))?,
            ISZERO => {
                let a = stack.pop()?;
                stack.push(U256::from(a.is_zero()))?;
            }
            AND => binary_op(stack, |a, b| a & b)?,
            OR => binary_op(stack, |a, b| a | b)?,
            XOR => binary_op(stack, |a, b| a ^ b)?,
            NOT => {
                let a = stack.pop()?;
                stack.push(!a)?;
            }
            BYTE => binary_op(stack, byte_at)?,
            SHL => binary_op(stack, |shift, value| checked_shl(value, shift))?,
            SHR => binary_op(stack, |shift, value| checked_shr(value, shift))?,
            SAR => binary_op(stack, sar)?,

            SHA3 => {
                let (offset, len) = (stack.pop()?, stack.pop()?);
                let words = gas::words_for(u64::try_from(len).map_err(|_| VmError::OutOfGas)?);
                gas.charge(words * gas::SHA3_WORD_GAS)?;
                gas.charge(memory.expansion_cost(offset, len)?)?;
                memory.grow(offset, len);
                let data = read_range(memory, offset, len)?;
                stack.push(U256::from_be_bytes(keccak256(&data).0))?;
            }

            // Environment.
            ADDRESS => stack.push(address_to_word(msg.address))?,
            BALANCE => {
                let address = word_to_address(stack.pop()?);
                let balance = self.host.balance(address);
                stack.push(balance)?;
            }
            ORIGIN => stack.push(address_to_word(msg.origin))?,
            CALLER => stack.push(address_to_word(msg.caller))?,
            CALLVALUE => stack.push(msg.value)?,
            CALLDATALOAD => {
                let offset = stack.pop()?;
                stack.push(load_word_padded(&msg.input, offset))?;
            }
            CALLDATASIZE => stack.push(U256::from(msg.input.len()))?,
            CALLDATACOPY => {
                let input = msg.input.clone();
                self.copy_to_memory(&input, stack, memory, gas)?;
            }
            CODESIZE => stack.push(U256::from(msg.code.len()))?,
            CODECOPY => {
                let code = msg.code.clone();
                self.copy_to_memory(&code, stack, memory, gas)?;
            }
            GASPRICE => stack.push(msg.gas_price)?,
            EXTCODESIZE => {
                let address = word_to_address(stack.pop()?);
                let size = self.host.code(address).len();
                stack.push(U256::from(size))?;
            }
            EXTCODECOPY => {
                let address = word_to_address(stack.pop()?);
                let code = self.host.code(address);
                self.copy_to_memory(&code, stack, memory, gas)?;
            }
            RETURNDATASIZE => stack.push(U256::from(returndata.len()))?,
            RETURNDATACOPY => {
                let (dest, src, len) = (stack.pop()?, stack.pop()?, stack.pop()?);
                let end = src.checked_add(len).ok_or(VmError::ReturnDataOutOfBounds)?;
                if end > U256::from(returndata.len()) {
                    return Err(VmError::ReturnDataOutOfBounds);
                }
                let words = gas::words_for(u64::try_from(len).map_err(|_| VmError::OutOfGas)?);
                gas.charge(words * gas::COPY_WORD_GAS)?;
                gas.charge(memory.expansion_cost(dest, len)?)?;
                memory.grow(dest, len);
                if !len.is_zero() {
                    let data =
                        returndata[to_usize(src)?..to_usize(end)?].to_vec();
                    memory.write(to_usize(dest)?, &data);
                }
            }
            EXTCODEHASH => {
                let address = word_to_address(stack.pop()?);
                let hash = if self.host.account_is_empty(address) {
                    B256::ZERO
                } else {
                    self.host.code_hash(address)
                };
                stack.push(U256::from_be_bytes(hash.0))?;
            }

            // Block context.
            BLOCKHASH => {
                let number = stack.pop()?;
                let hash = u64::try_from(number)
                    .ok()
                    .map_or(B256::ZERO, |number| self.host.block_hash(number));
                stack.push(U256::from_be_bytes(hash.0))?;
            }
            COINBASE => stack.push(address_to_word(self.block.beneficiary))?,
            TIMESTAMP => stack.push(U256::from(self.block.timestamp))?,
            NUMBER => stack.push(U256::from(self.block.number))?,
            DIFFICULTY => stack.push(self.block.difficulty)?,
            GASLIMIT => stack.push(U256::from(self.block.gas_limit))?,
            CHAINID => stack.push(U256::from(self.block.chain_id))?,
            SELFBALANCE => {
                let balance = self.host.balance(msg.address);
                stack.push(balance)?;
            }

            // Stack, memory, storage, flow.
            POP => {
                stack.pop()?;
            }
            MLOAD => {
                let offset = stack.pop()?;
                gas.charge(memory.expansion_cost(offset, U256::from(32))?)?;
                memory.grow(offset, U256::from(32));
                let word = memory.read_word(to_usize(offset)?);
                stack.push(word)?;
            }
            MSTORE => {
                let (offset, value) = (stack.pop()?, stack.pop()?);
                gas.charge(memory.expansion_cost(offset, U256::from(32))?)?;
                memory.grow(offset, U256::from(32));
                memory.write(to_usize(offset)?, &value.to_be_bytes::<32>());
            }
            MSTORE8 => {
                let (offset, value) = (stack.pop()?, stack.pop()?);
                gas.charge(memory.expansion_cost(offset, U256::from(1))?)?;
                memory.grow(offset, U256::from(1));
                memory.write(to_usize(offset)?, &[value.byte(0)]);
            }
            SLOAD => {
                let key = stack.pop()?;
                let value = self.host.storage(msg.address, key);
                stack.push(value)?;
            }
            SSTORE => {
                let (key, value) = (stack.pop()?, stack.pop()?);
                self.sstore(msg, key, value, gas)?;
            }
            JUMP => {
                let target = stack.pop()?;
                *pc = jump_target(target, jumpdests)?;
                return Ok(None);
            }
            JUMPI => {
                let (target, condition) = (stack.pop()?, stack.pop()?);
                if !condition.is_zero() {
                    *pc = jump_target(target, jumpdests)?;
                    return Ok(None);
                }
            }
            PC => stack.push(U256::from(*pc))?,
            MSIZE => stack.push(U256::from(memory.len()))?,
            GAS => stack.push(U256::from(gas.remaining()))?,
            JUMPDEST => {}

            PUSH1..=PUSH32 => {
                let count = (op - PUSH1) as usize + 1;
                let start = *pc + 1;
                let end = (start + count).min(msg.code.len());
                let mut word = [0u8; 32];
                // Immediates past the end of code read as zero.
                word[32 - count..32 - count + (end - start)]
                    .copy_from_slice(&msg.code[start..end]);
                stack.push(U256::from_be_bytes(word))?;
                *pc += count + 1;
                return Ok(None);
            }
            DUP1..=DUP16 => stack.dup((op - DUP1) as usize)?,
            SWAP1..=SWAP16 => stack.swap((op - SWAP1) as usize + 1)?,

            LOG0..=LOG4 => {
                if msg.is_static {
                    return Err(VmError::StaticModeViolation);
                }
                let topic_count = (op - LOG0) as usize;
                let (offset, len) = (stack.pop()?, stack.pop()?);
                let mut topics = Vec::with_capacity(topic_count);
                for _ in 0..topic_count {
                    topics.push(B256::from(stack.pop()?.to_be_bytes::<32>()));
                }
                let byte_len = u64::try_from(len).map_err(|_| VmError::OutOfGas)?;
                gas.charge(
                    gas::LOG_TOPIC_GAS * topic_count as u64 + gas::LOG_DATA_GAS * byte_len,
                )?;
                gas.charge(memory.expansion_cost(offset, len)?)?;
                memory.grow(offset, len);
                let data = read_range(memory, offset, len)?;
                self.host.log(Log { address: msg.address, topics, data: data.into() });
            }

            // Calls and creation.
            CREATE => {
                let halt = self.op_create(msg, None, stack, memory, gas, returndata)?;
                if halt.is_some() {
                    return Ok(halt);
                }
            }
            CREATE2 => {
                let salt = B256::from(stack.peek(3)?.to_be_bytes::<32>());
                let halt = self.op_create(msg, Some(salt), stack, memory, gas, returndata)?;
                if halt.is_some() {
                    return Ok(halt);
                }
            }
            CALL => self.op_call(msg, CallKind::Call, stack, memory, gas, returndata)?,
            CALLCODE => self.op_call(msg, CallKind::CallCode, stack, memory, gas, returndata)?,
            DELEGATECALL => {
                self.op_call(msg, CallKind::DelegateCall, stack, memory, gas, returndata)?;
            }
            STATICCALL => {
                self.op_call(msg, CallKind::StaticCall, stack, memory, gas, returndata)?;
            }

            RETURN => {
                let (offset, len) = (stack.pop()?, stack.pop()?);
                gas.charge(memory.expansion_cost(offset, len)?)?;
                memory.grow(offset, len);
                let output = read_range(memory, offset, len)?;
                return Ok(Some(Execution::success(gas.remaining(), output.into())));
            }
            REVERT => {
                let (offset, len) = (stack.pop()?, stack.pop()?);
                gas.charge(memory.expansion_cost(offset, len)?)?;
                memory.grow(offset, len);
                let output = read_range(memory, offset, len)?;
                return Ok(Some(Execution::revert(gas.remaining(), output.into())));
            }
            SELFDESTRUCT => {
                return self.op_selfdestruct(msg, stack, gas).map(Some);
            }

            invalid => return Err(VmError::InvalidOpcode(invalid)),
        }

        *pc += 1;
        Ok(None)
    }

    /// The shared tail of CALLDATACOPY, CODECOPY, and EXTCODECOPY: pops
    /// `(dest, src, len)`, charges copy and expansion gas, and writes the
    /// zero-padded source slice.
    fn copy_to_memory(
        &mut self,
        source: &[u8],
        stack: &mut Stack,
        memory: &mut Memory,
        gas: &mut Gas,
    ) -> Result<(), VmError> {
        let (dest, src, len) = (stack.pop()?, stack.pop()?, stack.pop()?);
        let byte_len = u64::try_from(len).map_err(|_| VmError::OutOfGas)?;
        gas.charge(gas::words_for(byte_len) * gas::COPY_WORD_GAS)?;
        gas.charge(memory.expansion_cost(dest, len)?)?;
        memory.grow(dest, len);
        if !len.is_zero() {
            let slice = slice_padded_source(source, src);
            memory.write_padded(to_usize(dest)?, to_usize(len)?, slice);
        }
        Ok(())
    }

    /// SSTORE pricing across the metering eras, then the write itself.
    fn sstore(
        &mut self,
        msg: &Message,
        key: U256,
        value: U256,
        gas: &mut Gas,
    ) -> Result<(), VmError> {
        if msg.is_static {
            return Err(VmError::StaticModeViolation);
        }

        let current = self.host.storage(msg.address, key);
        let net_metering = self.fork.at_least(Fork::Istanbul)
            || (self.fork.at_least(Fork::Constantinople)
                && !self.fork.at_least(Fork::Petersburg));

        if net_metering {
            // EIP-2200 (and its EIP-1283 ancestor): price against the
            // transaction-original value.
            let sload_gas = opcode::sload_cost(self.fork);
            if self.fork.at_least(Fork::Istanbul)
                && gas.remaining() <= gas::SSTORE_SENTRY_GAS
            {
                gas.charge(gas.remaining() + 1)?;
            }

            if current == value {
                gas.charge(sload_gas)?;
            } else {
                let original = self.host.original_storage(msg.address, key);
                if original == current {
                    if original.is_zero() {
                        gas.charge(gas::SSTORE_SET_GAS)?;
                    } else {
                        gas.charge(gas::SSTORE_RESET_GAS)?;
                        if value.is_zero() {
                            self.host.add_refund(gas::SSTORE_CLEAR_REFUND);
                        }
                    }
                } else {
                    gas.charge(sload_gas)?;
                    if !original.is_zero() {
                        if current.is_zero() {
                            self.host.sub_refund(gas::SSTORE_CLEAR_REFUND);
                        }
                        if value.is_zero() {
                            self.host.add_refund(gas::SSTORE_CLEAR_REFUND);
                        }
                    }
                    if original == value {
                        if original.is_zero() {
                            self.host.add_refund(gas::SSTORE_SET_GAS - sload_gas);
                        } else {
                            self.host.add_refund(gas::SSTORE_RESET_GAS - sload_gas);
                        }
                    }
                }
            }
        } else if current.is_zero() && !value.is_zero() {
            gas.charge(gas::SSTORE_SET_GAS)?;
        } else {
            gas.charge(gas::SSTORE_RESET_GAS)?;
            if !current.is_zero() && value.is_zero() {
                self.host.add_refund(gas::SSTORE_CLEAR_REFUND);
            }
        }

        self.host.set_storage(msg.address, key, value);
        Ok(())
    }
}

/// Pops two words, pushes `f(a, b)`.
fn binary_op(stack: &mut Stack, f: impl FnOnce(U256, U256) -> U256) -> Result<(), VmError> {
    let (a, b) = (stack.pop()?, stack.pop()?);
    stack.push(f(a, b))
}

/// Validates a jump target against the JUMPDEST bitmap.
fn jump_target(target: U256, jumpdests: &[bool]) -> Result<usize, VmError> {
    let target = usize::try_from(target).map_err(|_| VmError::InvalidJump)?;
    if jumpdests.get(target).copied().unwrap_or(false) {
        Ok(target)
    } else {
        Err(VmError::InvalidJump)
    }
}

/// Converts a U256 memory offset already covered by an expansion charge.
fn to_usize(value: U256) -> Result<usize, VmError> {
    usize::try_from(value).map_err(|_| VmError::OutOfGas)
}

/// Reads a grown memory range. A zero-length range reads empty regardless of
/// offset, matching the free zero-length access rule.
pub(crate) fn read_range(
    memory: &Memory,
    offset: U256,
    len: U256,
) -> Result<Vec<u8>, VmError> {
    if len.is_zero() {
        return Ok(Vec::new());
    }
    Ok(memory.read(to_usize(offset)?, to_usize(len)?))
}

/// Loads a 32-byte word from `data` at `offset`, zero-padded past the end.
fn load_word_padded(data: &[u8], offset: U256) -> U256 {
    let mut word = [0u8; 32];
    if let Ok(offset) = usize::try_from(offset) {
        if offset < data.len() {
            let available = (data.len() - offset).min(32);
            word[..available].copy_from_slice(&data[offset..offset + available]);
        }
    }
    U256::from_be_bytes(word)
}

/// The existing portion of `source` from `offset` on; bytes past the end are
/// implicit zeros supplied by the padded write.
fn slice_padded_source(source: &[u8], offset: U256) -> &[u8] {
    usize::try_from(offset).ok().and_then(|offset| source.get(offset..)).unwrap_or(&[])
}

/// Widens an address into a stack word.
pub(crate) fn address_to_word(address: Address) -> U256 {
    U256::from_be_slice(address.as_slice())
}

/// Truncates a stack word to its low 20 bytes.
pub(crate) fn word_to_address(word: U256) -> Address {
    Address::from_slice(&word.to_be_bytes::<32>()[12..])
}

/// Flips the sign bit, turning signed comparison into unsigned.
fn flip_sign(value: U256) -> U256 {
    value ^ (U256::from(1) << 255)
}

fn is_negative(value: U256) -> bool {
    value.bit(255)
}

fn twos_complement(value: U256) -> U256 {
    (!value).wrapping_add(U256::from(1))
}

fn sdiv(a: U256, b: U256) -> U256 {
    if b.is_zero() {
        return U256::ZERO;
    }
    let negative = is_negative(a) != is_negative(b);
    let a_abs = if is_negative(a) { twos_complement(a) } else { a };
    let b_abs = if is_negative(b) { twos_complement(b) } else { b };
    let quotient = a_abs / b_abs;
    if negative {
        twos_complement(quotient)
    } else {
        quotient
    }
}

fn smod(a: U256, b: U256) -> U256 {
    if b.is_zero() {
        return U256::ZERO;
    }
    let a_abs = if is_negative(a) { twos_complement(a) } else { a };
    let b_abs = if is_negative(b) { twos_complement(b) } else { b };
    let remainder = a_abs % b_abs;
    // The result takes the dividend's sign.
    if is_negative(a) {
        twos_complement(remainder)
    } else {
        remainder
    }
}

fn signextend(position: U256, value: U256) -> U256 {
    let Ok(position) = usize::try_from(position) else {
        return value;
    };
    if position >= 31 {
        return value;
    }
    let bit = position * 8 + 7;
    let mask = (U256::from(1) << (bit + 1)).wrapping_sub(U256::from(1));
    if value.bit(bit) {
        value | !mask
    } else {
        value & mask
    }
}

fn byte_at(index: U256, value: U256) -> U256 {
    match usize::try_from(index) {
        Ok(index) if index < 32 => U256::from(value.to_be_bytes::<32>()[index]),
        _ => U256::ZERO,
    }
}

fn checked_shl(value: U256, shift: U256) -> U256 {
    match usize::try_from(shift) {
        Ok(shift) if shift < 256 => value << shift,
        _ => U256::ZERO,
    }
}

fn checked_shr(value: U256, shift: U256) -> U256 {
    match usize::try_from(shift) {
        Ok(shift) if shift < 256 => value >> shift,
        _ => U256::ZERO,
    }
}

fn sar(shift: U256, value: U256) -> U256 {
    let negative = is_negative(value);
    match usize::try_from(shift) {
        Ok(shift) if shift < 256 => {
            let shifted = value >> shift;
            if negative && shift > 0 {
                // Fill vacated high bits with the sign.
                shifted | (!U256::ZERO << (256 - shift))
            } else {
                shifted
            }
        }
        _ => {
            if negative {
                U256::MAX
            } else {
                U256::ZERO
            }
        }
    }
}

/// The address of a CREATE-deployed contract: `Keccak256(rlp([sender,
/// nonce]))[12..]`.
pub fn create_address(caller: Address, nonce: u64) -> Address {
    use ember_rlp::{encode, Encodable, Item};
    let rlp = encode(&Item::list(vec![caller.to_rlp(), nonce.to_rlp()]));
    Address::from_slice(&keccak256(rlp)[12..])
}

/// The address of a CREATE2-deployed contract:
/// `Keccak256(0xff ++ sender ++ salt ++ Keccak256(init_code))[12..]`.
pub fn create2_address(caller: Address, salt: B256, init_code_hash: B256) -> Address {
    let mut preimage = Vec::with_capacity(1 + 20 + 32 + 32);
    preimage.push(0xFF);
    preimage.extend_from_slice(caller.as_slice());
    preimage.extend_from_slice(salt.as_slice());
    preimage.extend_from_slice(init_code_hash.as_slice());
    Address::from_slice(&keccak256(preimage)[12..])
}

/// True when `address` holds neither code nor a nonzero nonce, so a creation
/// may land there.
pub(crate) fn create_target_vacant<H: Host + ?Sized>(host: &mut H, address: Address) -> bool {
    let code_hash = host.code_hash(address);
    host.nonce(address) == 0 && (code_hash == B256::ZERO || code_hash == EMPTY_CODE_HASH)
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::{opcode::*, test_utils::MockHost, Status};
    use alloy_primitives::{address, hex, U256};

    fn run_code(
        host: &mut MockHost,
        fork: Fork,
        code: impl Into<Bytes>,
        gas: u64,
    ) -> Execution {
        let block = BlockEnv { chain_id: 1, number: 100, gas_limit: 10_000_000, ..Default::default() };
        let msg = Message {
            kind: CallKind::Call,
            address: address!("00000000000000000000000000000000000000aa"),
            code_address: address!("00000000000000000000000000000000000000aa"),
            caller: address!("00000000000000000000000000000000000000bb"),
            origin: address!("00000000000000000000000000000000000000bb"),
            gas,
            gas_price: U256::from(1),
            value: U256::ZERO,
            input: Bytes::new(),
            code: code.into(),
            depth: 0,
            is_static: false,
        };
        Evm::new(host, &block, fork).execute(msg)
    }

    /// `2 + 3`, stored to memory, returned as a word.
    fn add_and_return_code() -> Vec<u8> {
        vec![
            PUSH1, 0x02, PUSH1, 0x03, ADD, PUSH1, 0x00, MSTORE, PUSH1, 0x20, PUSH1, 0x00,
            RETURN,
        ]
    }

    #[test]
    fn test_add_and_return() {
        let mut host = MockHost::new();
        let result = run_code(&mut host, Fork::Byzantium, add_and_return_code(), 100_000);
        assert!(result.status.is_success());
        assert_eq!(U256::from_be_slice(&result.output), U256::from(5));
        // Four pushes, ADD, MSTORE with one word of memory, RETURN.
        assert_eq!(result.gas_left, 100_000 - 24);
    }

    #[test]
    fn test_determinism() {
        let first = run_code(&mut MockHost::new(), Fork::Istanbul, add_and_return_code(), 50_000);
        let second = run_code(&mut MockHost::new(), Fork::Istanbul, add_and_return_code(), 50_000);
        assert_eq!(first.status, second.status);
        assert_eq!(first.gas_left, second.gas_left);
        assert_eq!(first.output, second.output);
    }

    #[test]
    fn test_exp_dynamic_gas() {
        // 3 ** 2: the exponent occupies one byte.
        let code = vec![PUSH1, 0x02, PUSH1, 0x03, EXP, STOP];
        let result = run_code(&mut MockHost::new(), Fork::Byzantium, code, 10_000);
        assert!(result.status.is_success());
        assert_eq!(result.gas_left, 10_000 - 3 - 3 - 10 - 50);

        // Pre-Spurious the exponent byte costs 10.
        let code = vec![PUSH1, 0x02, PUSH1, 0x03, EXP, STOP];
        let result = run_code(&mut MockHost::new(), Fork::Homestead, code, 10_000);
        assert_eq!(result.gas_left, 10_000 - 3 - 3 - 10 - 10);
    }

    #[test]
    fn test_jump_and_invalid_jump() {
        // JUMP over an INVALID to a JUMPDEST.
        let code = vec![PUSH1, 0x04, JUMP, INVALID, JUMPDEST, STOP];
        let result = run_code(&mut MockHost::new(), Fork::Byzantium, code, 10_000);
        assert!(result.status.is_success());

        // Jumping into push data is invalid.
        let code = vec![PUSH1, 0x01, JUMP, PUSH1, JUMPDEST, STOP];
        let result = run_code(&mut MockHost::new(), Fork::Byzantium, code, 10_000);
        assert_eq!(result.status, Status::Failure(VmError::InvalidJump));
        assert_eq!(result.gas_left, 0);
    }

    #[test]
    fn test_out_of_gas_consumes_everything() {
        let code = vec![PUSH1, 0x01, PUSH1, 0x02, ADD, STOP];
        let result = run_code(&mut MockHost::new(), Fork::Byzantium, code, 7);
        assert_eq!(result.status, Status::Failure(VmError::OutOfGas));
        assert_eq!(result.gas_left, 0);
    }

    #[test]
    fn test_stack_underflow() {
        let result = run_code(&mut MockHost::new(), Fork::Byzantium, vec![ADD], 10_000);
        assert_eq!(result.status, Status::Failure(VmError::StackUnderflow));
    }

    #[test]
    fn test_undefined_opcode() {
        let result = run_code(&mut MockHost::new(), Fork::Byzantium, vec![0x0C], 10_000);
        assert_eq!(result.status, Status::Failure(VmError::InvalidOpcode(0x0C)));
    }

    #[test]
    fn test_sstore_set_and_clear_refund() {
        let mut host = MockHost::new();
        let contract = address!("00000000000000000000000000000000000000aa");

        // Store 1 at slot 0: the 20000 set cost.
        let set = vec![PUSH1, 0x01, PUSH1, 0x00, SSTORE, STOP];
        let result = run_code(&mut host, Fork::Byzantium, set, 30_000);
        assert!(result.status.is_success());
        assert_eq!(result.gas_left, 30_000 - 3 - 3 - 20_000);
        assert_eq!(host.storage.get(&(contract, U256::ZERO)), Some(&U256::from(1)));

        // Clear it: the 5000 reset cost plus the 15000 refund.
        let clear = vec![PUSH1, 0x00, PUSH1, 0x00, SSTORE, STOP];
        let result = run_code(&mut host, Fork::Byzantium, clear, 30_000);
        assert_eq!(result.gas_left, 30_000 - 3 - 3 - 5_000);
        assert_eq!(host.refund, 15_000);
    }

    #[test]
    fn test_sstore_istanbul_noop_write() {
        // Writing the value a slot already holds costs one SLOAD under
        // EIP-2200.
        let mut host = MockHost::new();
        let code = vec![PUSH1, 0x00, PUSH1, 0x07, SSTORE, STOP];
        let result = run_code(&mut host, Fork::Istanbul, code, 30_000);
        assert!(result.status.is_success());
        assert_eq!(result.gas_left, 30_000 - 3 - 3 - 800);
    }

    #[test]
    fn test_static_frame_rejects_sstore() {
        let block = BlockEnv::default();
        let mut host = MockHost::new();
        let msg = Message {
            kind: CallKind::StaticCall,
            address: address!("00000000000000000000000000000000000000aa"),
            code_address: address!("00000000000000000000000000000000000000aa"),
            caller: address!("00000000000000000000000000000000000000bb"),
            origin: address!("00000000000000000000000000000000000000bb"),
            gas: 30_000,
            gas_price: U256::ZERO,
            value: U256::ZERO,
            input: Bytes::new(),
            code: vec![PUSH1, 0x01, PUSH1, 0x00, SSTORE].into(),
            depth: 0,
            is_static: true,
        };
        let result = Evm::new(&mut host, &block, Fork::Byzantium).execute(msg);
        assert_eq!(result.status, Status::Failure(VmError::StaticModeViolation));
    }

    #[test]
    fn test_revert_rolls_back_and_returns_data() {
        let mut host = MockHost::new();
        let contract = address!("00000000000000000000000000000000000000aa");
        // SSTORE then REVERT with a one-word payload.
        let code = vec![
            PUSH1, 0x01, PUSH1, 0x00, SSTORE, // slot 0 = 1
            PUSH1, 0x2A, PUSH1, 0x00, MSTORE, // memory word = 42
            PUSH1, 0x20, PUSH1, 0x00, REVERT,
        ];
        let result = run_code(&mut host, Fork::Byzantium, code, 50_000);
        assert_eq!(result.status, Status::Revert);
        assert_eq!(U256::from_be_slice(&result.output), U256::from(42));
        assert!(result.gas_left > 0);
        // The write was journaled away.
        assert_eq!(host.storage.get(&(contract, U256::ZERO)), None);
    }

    #[test]
    fn test_call_and_returndata() {
        let mut host = MockHost::new();
        let callee = address!("00000000000000000000000000000000000000cc");
        // Callee returns the word 42.
        host.install_code(
            callee,
            vec![PUSH1, 0x2A, PUSH1, 0x00, MSTORE, PUSH1, 0x20, PUSH1, 0x00, RETURN],
        );

        // Caller calls it and re-returns the copied return window.
        let mut code = vec![
            PUSH1, 0x20, // out len
            PUSH1, 0x00, // out offset
            PUSH1, 0x00, // in len
            PUSH1, 0x00, // in offset
            PUSH1, 0x00, // value
        ];
        code.push(PUSH1 + 19); // PUSH20
        code.extend_from_slice(callee.as_slice());
        code.extend_from_slice(&[0x61, 0xFF, 0xFF]); // PUSH2 gas
        code.extend_from_slice(&[CALL, POP, PUSH1, 0x20, PUSH1, 0x00, RETURN]);

        let result = run_code(&mut host, Fork::Byzantium, code, 200_000);
        assert!(result.status.is_success());
        assert_eq!(U256::from_be_slice(&result.output), U256::from(42));
    }

    #[test]
    fn test_call_failure_pushes_zero_without_fault() {
        let mut host = MockHost::new();
        let callee = address!("00000000000000000000000000000000000000cc");
        host.install_code(callee, vec![INVALID]);

        // CALL, then return the success flag.
        let mut code = vec![
            PUSH1, 0x00, PUSH1, 0x00, PUSH1, 0x00, PUSH1, 0x00, PUSH1, 0x00,
        ];
        code.push(PUSH1 + 19);
        code.extend_from_slice(callee.as_slice());
        code.extend_from_slice(&[0x61, 0x0F, 0xFF]); // PUSH2 0x0fff
        code.extend_from_slice(&[CALL, PUSH1, 0x00, MSTORE, PUSH1, 0x20, PUSH1, 0x00, RETURN]);

        let result = run_code(&mut host, Fork::Byzantium, code, 200_000);
        assert!(result.status.is_success());
        assert_eq!(U256::from_be_slice(&result.output), U256::ZERO);
        // The callee's 0x0fff gas burned, but the caller survived.
        assert!(result.gas_left < 200_000 - 0x0FFF);
    }

    #[test]
    fn test_create_deploys_runtime_code() {
        let mut host = MockHost::new();
        let creator = address!("00000000000000000000000000000000000000aa");
        host.give(creator, U256::from(1));

        // Init code: copy the trailing byte of itself and return it.
        let init: Vec<u8> = vec![
            PUSH1, 0x01, PUSH1, 0x0C, PUSH1, 0x00, CODECOPY,
            PUSH1, 0x01, PUSH1, 0x00, RETURN, STOP,
        ];
        let block = BlockEnv::default();
        let expected = create_address(creator, 0);
        let msg = Message {
            kind: CallKind::Create,
            address: expected,
            code_address: expected,
            caller: creator,
            origin: creator,
            gas: 100_000,
            gas_price: U256::ZERO,
            value: U256::ZERO,
            input: Bytes::new(),
            code: init.into(),
            depth: 0,
            is_static: false,
        };
        let result = Evm::new(&mut host, &block, Fork::Byzantium).execute(msg);
        assert!(result.status.is_success());
        assert_eq!(host.codes.get(&expected).map(|code| code.as_ref()), Some(&[STOP][..]));
        // EIP-161: the new contract starts at nonce one.
        assert_eq!(host.nonces.get(&expected), Some(&1));
    }

    #[test]
    fn test_call_reaches_precompile() {
        let mut host = MockHost::new();
        // Write a word holding 0xdeadbeef, call identity on its low 4 bytes,
        // and return the echoed window.
        let mut code = Vec::new();
        code.extend_from_slice(&[0x63, 0xDE, 0xAD, 0xBE, 0xEF]); // PUSH4
        code.extend_from_slice(&[PUSH1, 0x00, MSTORE]);
        code.extend_from_slice(&[
            PUSH1, 0x04, // out len
            PUSH1, 0x40, // out offset
            PUSH1, 0x04, // in len
            PUSH1, 0x1C, // in offset (low 4 bytes of the word)
            PUSH1, 0x00, // value
            PUSH1, 0x04, // identity precompile
        ]);
        code.extend_from_slice(&[0x61, 0xFF, 0xFF]); // PUSH2 gas
        code.extend_from_slice(&[CALL, POP, PUSH1, 0x04, PUSH1, 0x40, RETURN]);

        let result = run_code(&mut host, Fork::Byzantium, code, 200_000);
        assert!(result.status.is_success());
        assert_eq!(result.output.as_ref(), hex!("deadbeef"));
    }

    #[test]
    fn test_signed_helpers() {
        let neg = |n: u64| twos_complement(U256::from(n));
        assert_eq!(sdiv(neg(8), U256::from(3)), neg(2));
        assert_eq!(sdiv(U256::from(8), U256::from(3)), U256::from(2));
        assert_eq!(sdiv(U256::from(8), U256::ZERO), U256::ZERO);
        assert_eq!(smod(neg(8), U256::from(3)), neg(2));
        assert_eq!(smod(U256::from(8), U256::from(3)), U256::from(2));
        assert_eq!(sar(U256::from(1), neg(4)), neg(2));
        assert_eq!(sar(U256::from(300), neg(4)), U256::MAX);
        assert_eq!(sar(U256::from(1), U256::from(4)), U256::from(2));
        assert_eq!(
            signextend(U256::ZERO, U256::from(0xFFu64)),
            U256::MAX
        );
        assert_eq!(signextend(U256::ZERO, U256::from(0x7Fu64)), U256::from(0x7F));
        assert_eq!(byte_at(U256::from(31), U256::from(0xABu64)), U256::from(0xAB));
        assert_eq!(byte_at(U256::from(32), U256::from(0xABu64)), U256::ZERO);
    }

    #[test]
    fn test_create_address_vector() {
        // The canonical example: the first contract of
        // 0x6ac7ea33f8831ea9dcc53393aaa88b25a785dbf0 at nonce zero.
        let creator = address!("6ac7ea33f8831ea9dcc53393aaa88b25a785dbf0");
        assert_eq!(
            create_address(creator, 0),
            address!("cd234a471b72ba2f1ccf0a70fcaba648a5eecd8d")
        );
        assert_ne!(create_address(creator, 1), create_address(creator, 0));
    }
}
