//! The scoped environment ("chained map") shared by the interpreter and every back-end.
//!
//! Each component stores its own binding payload behind the generic parameter `B`: the
//! interpreter binds runtime `Value`s, the WVM binds slot descriptors, the WAT emitter
//! binds its scope descriptors, and the LLVM emitter binds SSA handles. All four reuse
//! this one chained-map structure instead of reimplementing lookup/child-creation per
//! back-end.
//!
//! Back-ends additionally abuse this same structure to carry loop-exit targets by
//! binding the reserved names `"break"`/`"continue"` in a fresh child scope on loop
//! entry (§4.7). [`Scope::bind_loop_labels`]/[`Scope::loop_labels`] wrap that convention
//! so callers never have to spell out the reserved names themselves.

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

const BREAK_LABEL: &str = "break";
const CONTINUE_LABEL: &str = "continue";

struct Frame<B> {
	parent: Option<Scope<B>>,
	bindings: HashMap<String, B>,
}

/// A child of an enclosing scope (or none at the root), holding local bindings of type `B`.
///
/// Cloning a `Scope` is O(1) and shares the same underlying frame (it is a handle, not a
/// deep copy); creating a *child* scope is also O(1), per §3.5's invariant.
pub struct Scope<B> {
	frame: Rc<RefCell<Frame<B>>>,
}

impl<B> Clone for Scope<B> {
	fn clone(&self) -> Self {
		Self { frame: Rc::clone(&self.frame) }
	}
}

/// The outcome of attempting to bind a new name into the local frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DefineError {
	/// A binding with this name already exists in the local frame.
	AlreadyDefined,
}

impl<B> Scope<B> {
	/// Creates a new root scope with no parent.
	#[must_use]
	pub fn root() -> Self {
		Self {
			frame: Rc::new(RefCell::new(Frame { parent: None, bindings: HashMap::new() })),
		}
	}

	/// Creates a new child of `self`. O(1).
	#[must_use]
	pub fn child(&self) -> Self {
		Self {
			frame: Rc::new(RefCell::new(Frame {
				parent: Some(self.clone()),
				bindings: HashMap::new(),
			})),
		}
	}

	/// Defines `name` in the local frame only. Fails if `name` already exists locally;
	/// shadowing a parent's binding of the same name is allowed (the new binding simply
	/// becomes the one found first during lookup from this scope onward).
	pub fn define(&self, name: impl Into<String>, value: B) -> Result<(), DefineError> {
		let name = name.into();
		let mut frame = self.frame.borrow_mut();
		if frame.bindings.contains_key(&name) {
			return Err(DefineError::AlreadyDefined);
		}
		frame.bindings.insert(name, value);
		Ok(())
	}

	/// Returns whether `name` exists in the local frame only (no parent walk).
	#[must_use]
	pub fn contains_local(&self, name: &str) -> bool {
		self.frame.borrow().bindings.contains_key(name)
	}
}

impl<B: Clone> Scope<B> {
	/// Walks from `self` up through parents looking for `name`, returning a clone of the
	/// first binding found.
	#[must_use]
	pub fn get(&self, name: &str) -> Option<B> {
		let frame = self.frame.borrow();
		if let Some(value) = frame.bindings.get(name) {
			return Some(value.clone());
		}
		frame.parent.as_ref().and_then(|parent| parent.get(name))
	}

	/// Mutates the binding for `name`, walking up to the frame that actually owns it.
	/// Returns `false` if no such binding exists anywhere in the chain.
	pub fn assign(&self, name: &str, value: B) -> bool {
		let mut frame = self.frame.borrow_mut();
		if frame.bindings.contains_key(name) {
			frame.bindings.insert(name.to_owned(), value);
			return true;
		}
		match &frame.parent {
			Some(parent) => parent.assign(name, value),
			None => false,
		}
	}

	/// Binds this scope's loop-exit targets using the reserved `"break"`/`"continue"`
	/// names, per §4.7's scope-as-jump-target convention. Intended to be called on a
	/// fresh child scope created at loop entry.
	pub fn bind_loop_labels(&self, break_target: B, continue_target: B) {
		let mut frame = self.frame.borrow_mut();
		frame.bindings.insert(BREAK_LABEL.to_owned(), break_target);
		frame.bindings.insert(CONTINUE_LABEL.to_owned(), continue_target);
	}

	/// Looks up the innermost enclosing loop's `(break, continue)` targets.
	#[must_use]
	pub fn loop_labels(&self) -> Option<(B, B)> {
		Some((self.get(BREAK_LABEL)?, self.get(CONTINUE_LABEL)?))
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn lookup_walks_parent_chain() {
		let root = Scope::root();
		root.define("x", 1).unwrap();
		let child = root.child();
		assert_eq!(child.get("x"), Some(1));
	}

	#[test]
	fn define_fails_only_on_local_duplicate() {
		let root = Scope::<i32>::root();
		root.define("x", 1).unwrap();
		assert_eq!(root.define("x", 2), Err(DefineError::AlreadyDefined));

		let child = root.child();
		// shadowing in a child scope is fine
		assert!(child.define("x", 2).is_ok());
		assert_eq!(child.get("x"), Some(2));
		assert_eq!(root.get("x"), Some(1));
	}

	#[test]
	fn assign_mutates_the_owning_frame() {
		let root = Scope::root();
		root.define("x", 1).unwrap();
		let child = root.child();
		assert!(child.assign("x", 99));
		assert_eq!(root.get("x"), Some(99));
		assert!(!child.assign("never-declared", 0));
	}

	#[test]
	fn loop_labels_are_visible_to_nested_scopes() {
		let root = Scope::root();
		let loop_scope = root.child();
		loop_scope.bind_loop_labels("exit", "test");
		let nested = loop_scope.child();
		assert_eq!(nested.loop_labels(), Some(("exit", "test")));
	}
}
