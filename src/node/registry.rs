//! Node identity registry
//!
//! One wrapper per raw node, discoverable from the raw side: every raw
//! node carries an opaque slot holding a weak back-pointer to its
//! wrapper. `wrap` is the single lookup-or-create path; nothing else in
//! the crate constructs wrapper state.

use std::any::Any;
use std::cell::{Cell, RefCell};
use std::rc::Rc;

use super::{NodeInner, StoreRef, XmlNode};
use crate::engine::store::RawId;

/// Returns the existing wrapper for a raw node, without creating one.
pub(crate) fn lookup(store: &StoreRef, id: RawId) -> Option<XmlNode> {
    let weak = {
        let s = store.borrow();
        if !s.is_alive(id) {
            return None;
        }
        s.node(id).wrapper.clone()?
    };
    let any = weak.upgrade()?;
    let inner = any.downcast::<NodeInner>().ok()?;
    Some(XmlNode { inner })
}

/// Returns the wrapper for a raw node, creating and registering it on
/// first access. A freshly created wrapper for a node that is linked
/// into the tree is recorded in its parent's child set, wrapping the
/// parent first if needed.
pub(crate) fn wrap(store: &StoreRef, id: RawId) -> XmlNode {
    if let Some(existing) = lookup(store, id) {
        return existing;
    }

    let inner = Rc::new(NodeInner {
        store: RefCell::new(store.clone()),
        raw: Cell::new(id),
        child_nodes: RefCell::new(Vec::new()),
        object_value: RefCell::new(None),
        mime_type: RefCell::new(None),
    });
    {
        let mut s = store.borrow_mut();
        debug_assert!(
            s.node(id)
                .wrapper
                .as_ref()
                .map_or(true, |w| w.strong_count() == 0),
            "only one wrapper per raw node"
        );
        let any: Rc<dyn Any> = inner.clone();
        s.node_mut(id).wrapper = Some(Rc::downgrade(&any));
    }
    let node = XmlNode { inner };

    let parent = { store.borrow().node(id).parent };
    if let Some(parent_id) = parent {
        let parent_node = wrap(store, parent_id);
        parent_node.register_child(&node);
    }
    node
}
