//! The sub-call instructions: CALL, CALLCODE, DELEGATECALL, STATICCALL,
//! CREATE, CREATE2, and SELFDESTRUCT.

use crate::{
    gas::{self, Gas},
    interpreter::{
        address_to_word, create2_address, create_address, create_target_vacant, word_to_address,
        CALL_DEPTH_LIMIT,
    },
    CallKind, Execution, Host, Memory, Message, Stack, Status, VmError,
};
use alloy_primitives::{keccak256, Bytes, B256, U256};
use ember_genesis::Fork;

impl<H: Host + ?Sized> crate::Evm<'_, H> {
    /// The CALL-family instruction body. Pushes the success flag; failures of
    /// the callee never fault the caller.
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn op_call(
        &mut self,
        msg: &Message,
        kind: CallKind,
        stack: &mut Stack,
        memory: &mut Memory,
        gas: &mut Gas,
        returndata: &mut Bytes,
    ) -> Result<(), VmError> {
        let requested_gas = stack.pop()?;
        let callee = word_to_address(stack.pop()?);
        let value = match kind {
            CallKind::Call | CallKind::CallCode => stack.pop()?,
            // DELEGATECALL inherits the frame's apparent value; STATICCALL
            // transfers nothing.
            CallKind::DelegateCall | CallKind::StaticCall => U256::ZERO,
            CallKind::Create | CallKind::Create2 { .. } => unreachable!("creation has its own op"),
        };
        let (in_offset, in_len) = (stack.pop()?, stack.pop()?);
        let (out_offset, out_len) = (stack.pop()?, stack.pop()?);

        if kind == CallKind::Call && msg.is_static && !value.is_zero() {
            return Err(VmError::StaticModeViolation);
        }

        // Memory for both the argument and return windows.
        gas.charge(memory.expansion_cost(in_offset, in_len)?)?;
        memory.grow(in_offset, in_len);
        gas.charge(memory.expansion_cost(out_offset, out_len)?)?;
        memory.grow(out_offset, out_len);

        // Transfer and new-account surcharges.
        let transfers_value = !value.is_zero();
        if transfers_value {
            gas.charge(gas::CALL_VALUE_GAS)?;
        }
        if kind == CallKind::Call {
            let charges_new_account = if self.fork.at_least(Fork::SpuriousDragon) {
                transfers_value && self.host.account_is_empty(callee)
            } else {
                !self.host.account_exists(callee)
            };
            if charges_new_account {
                gas.charge(gas::NEW_ACCOUNT_GAS)?;
            }
        }

        let forwarded = self.forwardable_gas(requested_gas, gas)?;
        gas.charge(forwarded)?;
        let callee_gas = if transfers_value { forwarded + gas::CALL_STIPEND } else { forwarded };

        // A too-deep call or an underfunded transfer is a completed call that
        // pushes zero; the forwarded gas comes back.
        let balance_short = transfers_value && self.host.balance(msg.address) < value;
        if msg.depth + 1 > CALL_DEPTH_LIMIT || balance_short {
            gas.refund(forwarded);
            *returndata = Bytes::new();
            return stack.push(U256::ZERO);
        }

        let (context_address, context_caller, context_value) = match kind {
            CallKind::Call | CallKind::StaticCall => (callee, msg.address, value),
            CallKind::CallCode => (msg.address, msg.address, value),
            CallKind::DelegateCall => (msg.address, msg.caller, msg.value),
            CallKind::Create | CallKind::Create2 { .. } => unreachable!(),
        };

        let input = crate::interpreter::read_range(memory, in_offset, in_len)?;
        let code = self.host.code(callee);
        let sub_msg = Message {
            kind,
            address: context_address,
            code_address: callee,
            caller: context_caller,
            origin: msg.origin,
            gas: callee_gas,
            gas_price: msg.gas_price,
            value: context_value,
            input: input.into(),
            code,
            depth: msg.depth + 1,
            is_static: msg.is_static || kind == CallKind::StaticCall,
        };

        let result = self.execute(sub_msg);

        *returndata = result.output.clone();
        let copy_len = result.output.len().min(
            usize::try_from(out_len).map_err(|_| VmError::OutOfGas)?,
        );
        if copy_len > 0 {
            memory.write(
                usize::try_from(out_offset).map_err(|_| VmError::OutOfGas)?,
                &result.output[..copy_len],
            );
        }
        gas.refund(result.gas_left);
        stack.push(U256::from(result.status.is_success()))
    }

    /// The CREATE/CREATE2 instruction body. Pushes the new contract address,
    /// or zero when the creation frame did not complete.
    pub(crate) fn op_create(
        &mut self,
        msg: &Message,
        salt: Option<B256>,
        stack: &mut Stack,
        memory: &mut Memory,
        gas: &mut Gas,
        returndata: &mut Bytes,
    ) -> Result<Option<Execution>, VmError> {
        if msg.is_static {
            return Err(VmError::StaticModeViolation);
        }

        let value = stack.pop()?;
        let (offset, len) = (stack.pop()?, stack.pop()?);
        if salt.is_some() {
            stack.pop()?;
        }

        gas.charge(memory.expansion_cost(offset, len)?)?;
        memory.grow(offset, len);
        let byte_len = u64::try_from(len).map_err(|_| VmError::OutOfGas)?;
        if salt.is_some() {
            // CREATE2 pays to hash the initialization code.
            gas.charge(gas::words_for(byte_len) * gas::SHA3_WORD_GAS)?;
        }
        let init_code: Bytes =
            crate::interpreter::read_range(memory, offset, len)?.into();

        let forwarded = if self.fork.at_least(Fork::Tangerine) {
            gas::all_but_one_64th(gas.remaining())
        } else {
            gas.remaining()
        };
        gas.charge(forwarded)?;

        *returndata = Bytes::new();
        if msg.depth + 1 > CALL_DEPTH_LIMIT || self.host.balance(msg.address) < value {
            gas.refund(forwarded);
            stack.push(U256::ZERO)?;
            return Ok(None);
        }

        let nonce = self.host.increment_nonce(msg.address);
        let new_address = match salt {
            Some(salt) => create2_address(msg.address, salt, keccak256(&init_code)),
            None => create_address(msg.address, nonce),
        };

        // An occupied target burns the forwarded gas.
        if !create_target_vacant(self.host, new_address) {
            stack.push(U256::ZERO)?;
            return Ok(None);
        }

        let sub_msg = Message {
            kind: salt.map_or(CallKind::Create, |salt| CallKind::Create2 { salt }),
            address: new_address,
            code_address: new_address,
            caller: msg.address,
            origin: msg.origin,
            gas: forwarded,
            gas_price: msg.gas_price,
            value,
            input: Bytes::new(),
            code: init_code,
            depth: msg.depth + 1,
            is_static: false,
        };

        let result = self.execute(sub_msg);
        match result.status {
            Status::Success => {
                gas.refund(result.gas_left);
                stack.push(address_to_word(new_address))?;
            }
            Status::Revert => {
                gas.refund(result.gas_left);
                *returndata = result.output;
                stack.push(U256::ZERO)?;
            }
            Status::Failure(_) => {
                stack.push(U256::ZERO)?;
            }
        }
        Ok(None)
    }

    /// The SELFDESTRUCT instruction body: schedules the account for removal
    /// and halts the frame.
    pub(crate) fn op_selfdestruct(
        &mut self,
        msg: &Message,
        stack: &mut Stack,
        gas: &mut Gas,
    ) -> Result<Execution, VmError> {
        if msg.is_static {
            return Err(VmError::StaticModeViolation);
        }
        let beneficiary = word_to_address(stack.pop()?);

        let charges_new_account = if self.fork.at_least(Fork::SpuriousDragon) {
            !self.host.balance(msg.address).is_zero()
                && self.host.account_is_empty(beneficiary)
        } else if self.fork.at_least(Fork::Tangerine) {
            !self.host.account_exists(beneficiary)
        } else {
            false
        };
        if charges_new_account {
            gas.charge(gas::NEW_ACCOUNT_GAS)?;
        }

        if self.host.selfdestruct(msg.address, beneficiary) {
            self.host.add_refund(gas::SELFDESTRUCT_REFUND);
        }
        Ok(Execution::success(gas.remaining(), Bytes::new()))
    }

    /// The gas a frame may hand to a sub-call: capped at 63/64 of what
    /// remains after Tangerine, a hard requirement before.
    fn forwardable_gas(&self, requested: U256, gas: &Gas) -> Result<u64, VmError> {
        if self.fork.at_least(Fork::Tangerine) {
            let cap = gas::all_but_one_64th(gas.remaining());
            Ok(u64::try_from(requested).map_or(cap, |requested| requested.min(cap)))
        } else {
            let requested = u64::try_from(requested).map_err(|_| VmError::OutOfGas)?;
            if requested > gas.remaining() {
                return Err(VmError::OutOfGas);
            }
            Ok(requested)
        }
    }
}
