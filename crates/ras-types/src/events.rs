//! Event types for inter-component and inter-provider communication.
//!
//! `OrderEvent` is broadcast inside a process on the engine event bus.
//! `OrderSignal` is what an owning provider tells a remote requester about
//! an order it executes on the requester's behalf.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::{OrderId, OrderState};

/// Events published on the engine event bus.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OrderEvent {
	/// An order was admitted into the registry.
	Activated { order_id: OrderId },
	/// An order moved between two state lists.
	StateChanged {
		order_id: OrderId,
		from: OrderState,
		to: OrderState,
	},
	/// An order was closed and removed from the registry.
	Closed { order_id: OrderId },
}

/// Notification sent from the owning provider to a remote requester.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderSignal {
	Fulfilled,
	FailedOnRequest,
	FailedAfterSuccessfulRequest,
	Closed,
}

impl OrderSignal {
	/// Returns the signal a remote requester must receive for a state, if any.
	pub fn for_state(state: OrderState) -> Option<Self> {
		match state {
			OrderState::Fulfilled => Some(OrderSignal::Fulfilled),
			OrderState::FailedOnRequest => Some(OrderSignal::FailedOnRequest),
			OrderState::FailedAfterSuccessfulRequest => {
				Some(OrderSignal::FailedAfterSuccessfulRequest)
			},
			OrderState::Closed => Some(OrderSignal::Closed),
			_ => None,
		}
	}

	/// State the requester-side mirror moves to on receipt.
	pub fn target_state(&self) -> OrderState {
		match self {
			OrderSignal::Fulfilled => OrderState::Fulfilled,
			OrderSignal::FailedOnRequest => OrderState::FailedOnRequest,
			OrderSignal::FailedAfterSuccessfulRequest => OrderState::FailedAfterSuccessfulRequest,
			OrderSignal::Closed => OrderState::Closed,
		}
	}
}

impl fmt::Display for OrderSignal {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "{}", self.target_state())
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_signal_round_trips_through_state() {
		for state in OrderState::ALL {
			if let Some(signal) = OrderSignal::for_state(state) {
				assert_eq!(signal.target_state(), state);
			}
		}
		assert_eq!(OrderSignal::for_state(OrderState::Spawning), None);
	}
}
