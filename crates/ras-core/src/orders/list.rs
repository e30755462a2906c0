//! Cursor-indexed concurrent list.
//!
//! Each registry state owns one of these lists. A processor walks its list
//! with [`CursorList::get_next`] while other tasks append and remove
//! entries concurrently. Removal and the cursor are kept consistent under a
//! single lock:
//!
//! - removing the node under the cursor advances the cursor to its successor,
//! - appending while the cursor is past the end makes the new node current,
//! - `get_next` returns `None` exactly once at the end of a pass and then
//!   rewinds to the head.
//!
//! Items are identified by `Arc` pointer identity, so the same value can only
//! be a member once.

use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;

struct Node<T> {
	item: Arc<T>,
	prev: Option<usize>,
	next: Option<usize>,
}

struct Inner<T> {
	slots: Vec<Option<Node<T>>>,
	free: Vec<usize>,
	index: HashMap<usize, usize>,
	head: Option<usize>,
	tail: Option<usize>,
	cursor: Option<usize>,
}

impl<T> Inner<T> {
	fn node(&self, slot: usize) -> Option<&Node<T>> {
		self.slots.get(slot).and_then(|node| node.as_ref())
	}

	fn node_mut(&mut self, slot: usize) -> Option<&mut Node<T>> {
		self.slots.get_mut(slot).and_then(|node| node.as_mut())
	}

	fn allocate(&mut self, node: Node<T>) -> usize {
		match self.free.pop() {
			Some(slot) => {
				self.slots[slot] = Some(node);
				slot
			},
			None => {
				self.slots.push(Some(node));
				self.slots.len() - 1
			},
		}
	}
}

fn identity<T>(item: &Arc<T>) -> usize {
	Arc::as_ptr(item) as usize
}

/// Doubly linked list with a shared traversal cursor.
pub struct CursorList<T> {
	inner: Mutex<Inner<T>>,
}

impl<T> Default for CursorList<T> {
	fn default() -> Self {
		Self::new()
	}
}

impl<T> CursorList<T> {
	pub fn new() -> Self {
		Self {
			inner: Mutex::new(Inner {
				slots: Vec::new(),
				free: Vec::new(),
				index: HashMap::new(),
				head: None,
				tail: None,
				cursor: None,
			}),
		}
	}

	/// Appends an item at the tail.
	///
	/// Returns false if the item is already a member.
	pub fn add_item(&self, item: Arc<T>) -> bool {
		let mut inner = self.inner.lock();
		let key = identity(&item);
		if inner.index.contains_key(&key) {
			return false;
		}

		let tail = inner.tail;
		let slot = inner.allocate(Node {
			item,
			prev: tail,
			next: None,
		});
		match tail.and_then(|t| inner.node_mut(t)) {
			Some(node) => node.next = Some(slot),
			None => inner.head = Some(slot),
		}
		inner.tail = Some(slot);
		inner.index.insert(key, slot);

		// Cursor past the end: the new tail is the next item of this pass.
		if inner.cursor.is_none() {
			inner.cursor = Some(slot);
		}
		true
	}

	/// Returns the item under the cursor and advances it.
	///
	/// At the end of a pass returns `None` once and rewinds to the head.
	pub fn get_next(&self) -> Option<Arc<T>> {
		let mut inner = self.inner.lock();
		match inner.cursor {
			Some(slot) => {
				let (item, next) = {
					let node = inner.node(slot)?;
					(node.item.clone(), node.next)
				};
				inner.cursor = next;
				Some(item)
			},
			None => {
				inner.cursor = inner.head;
				None
			},
		}
	}

	/// Removes an item by identity.
	///
	/// Returns false if the item was not a member.
	pub fn remove_item(&self, item: &Arc<T>) -> bool {
		let mut inner = self.inner.lock();
		let Some(slot) = inner.index.remove(&identity(item)) else {
			return false;
		};
		let Some(node) = inner.slots.get_mut(slot).and_then(|node| node.take()) else {
			return false;
		};

		match node.prev.and_then(|p| inner.node_mut(p)) {
			Some(prev) => prev.next = node.next,
			None => inner.head = node.next,
		}
		match node.next.and_then(|n| inner.node_mut(n)) {
			Some(next) => next.prev = node.prev,
			None => inner.tail = node.prev,
		}
		if inner.cursor == Some(slot) {
			inner.cursor = node.next;
		}
		inner.free.push(slot);
		true
	}

	/// Moves the cursor back to the head.
	pub fn reset_pointer(&self) {
		let mut inner = self.inner.lock();
		inner.cursor = inner.head;
	}

	pub fn contains(&self, item: &Arc<T>) -> bool {
		self.inner.lock().index.contains_key(&identity(item))
	}

	pub fn len(&self) -> usize {
		self.inner.lock().index.len()
	}

	pub fn is_empty(&self) -> bool {
		self.len() == 0
	}

	/// Returns the members in list order without moving the cursor.
	pub fn snapshot(&self) -> Vec<Arc<T>> {
		let inner = self.inner.lock();
		let mut items = Vec::with_capacity(inner.index.len());
		let mut current = inner.head;
		while let Some(node) = current.and_then(|slot| inner.node(slot)) {
			items.push(node.item.clone());
			current = node.next;
		}
		items
	}
}
