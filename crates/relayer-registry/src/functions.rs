//! Allow-listed function descriptors and calldata decoding.

use crate::RegistryError;
use alloy::dyn_abi::{DynSolValue, JsonAbiExt};
use alloy::json_abi::{Function, JsonAbi};
use relayer_types::{Address, Selector, U256};

/// A function a contract is allowed to relay.
#[derive(Debug, Clone)]
pub struct FunctionDescriptor {
	/// Canonical signature, e.g. `transferSNT(address,uint256,uint256,uint256,bytes)`.
	pub signature: String,
	pub name: String,
	pub selector: Selector,
	/// Whether the call moves a base token out of an identity.
	pub is_token: bool,
	function: Function,
}

impl FunctionDescriptor {
	/// Builds a descriptor from a configured signature.
	///
	/// Parameter names come from the signature itself when it carries them,
	/// otherwise from the matching entry of `abi`.
	pub fn parse(signature: &str, is_token: bool, abi: Option<&JsonAbi>) -> Result<Self, RegistryError> {
		let mut function = Function::parse(signature).map_err(|e| RegistryError::InvalidSignature {
			signature: signature.to_string(),
			reason: e.to_string(),
		})?;
		let selector = function.selector();

		if let Some(abi_function) = abi
			.and_then(|abi| abi.function(&function.name))
			.and_then(|overloads| overloads.iter().find(|f| f.selector() == selector))
		{
			for (param, named) in function.inputs.iter_mut().zip(&abi_function.inputs) {
				if param.name.is_empty() {
					param.name = named.name.clone();
				}
			}
		}

		Ok(Self {
			signature: function.signature(),
			name: function.name.clone(),
			selector,
			is_token,
			function,
		})
	}

	/// Ordered parameter names; unnamed parameters are empty strings.
	pub fn param_names(&self) -> Vec<&str> {
		self.function.inputs.iter().map(|p| p.name.as_str()).collect()
	}

	/// Decodes full calldata (selector included) into named parameters.
	pub fn decode(&self, call_data: &[u8]) -> Result<DecodedCall, RegistryError> {
		if call_data.len() < 4 || call_data[..4] != self.selector[..] {
			return Err(RegistryError::Decode(format!("calldata does not call {}", self.signature)));
		}

		let values = self
			.function
			.abi_decode_input(&call_data[4..])
			.map_err(|e| RegistryError::Decode(e.to_string()))?;

		let params = self
			.function
			.inputs
			.iter()
			.map(|p| p.name.clone())
			.zip(values)
			.collect();

		Ok(DecodedCall { params })
	}
}

/// Decoded parameters of a relayed call.
#[derive(Debug, Clone)]
pub struct DecodedCall {
	params: Vec<(String, DynSolValue)>,
}

impl DecodedCall {
	pub fn get(&self, name: &str) -> Option<&DynSolValue> {
		self.params.iter().find(|(n, _)| n == name).map(|(_, v)| v)
	}

	pub fn address(&self, name: &str) -> Option<Address> {
		self.get(name).and_then(DynSolValue::as_address)
	}

	pub fn uint(&self, name: &str) -> Option<U256> {
		self.get(name).and_then(DynSolValue::as_uint).map(|(value, _)| value)
	}
}
