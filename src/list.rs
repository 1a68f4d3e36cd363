use std::{marker::PhantomData, ptr::NonNull};


/// Non-null pointer to `T`.
pub(crate) type Link<T> = Option<NonNull<T>>;

/// Header of every element stored in a [`List`]. The node is written in the
/// same memory it describes, so the list never allocates.
pub(crate) struct Node<T> {
    /// Pointer to the next node of the list
    pub next: Link<Self>,
    /// Pointer to the previous node of the list
    pub prev: Link<Self>,
    /// Element of the node
    pub data: T,
}

/// Intrusive doubly linked list. Keeps `head`, `tail` and the number of nodes,
/// but nodes themselves live wherever the caller placed them.
///
/// ```text
///          +------+    +------+    +------+
/// head --> | Node | -> | Node | -> | Node | <-- tail
///          |      | <- |      | <- |      |
///          +------+    +------+    +------+
/// ```
pub(crate) struct List<T> {
    head: Link<Node<T>>,
    tail: Link<Node<T>>,
    len: usize,
    marker: PhantomData<T>,
}

pub(crate) struct Iter<'a, T> {
    current: Link<Node<T>>,
    remaining: usize,
    marker: PhantomData<&'a T>,
}

/// Same as [`Iter`] but yields the nodes themselves. The allocator needs the
/// node address to compute payload pointers and to relink neighbours.
pub(crate) struct Nodes<'a, T> {
    current: Link<Node<T>>,
    remaining: usize,
    marker: PhantomData<&'a T>,
}

impl<T> List<T> {
    pub const fn new() -> Self {
        Self {
            head: None,
            tail: None,
            len: 0,
            marker: PhantomData,
        }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    #[inline]
    pub fn first(&self) -> Link<Node<T>> {
        self.head
    }

    #[inline]
    pub fn last(&self) -> Link<Node<T>> {
        self.tail
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Writes a new node at `addr` and makes it the head of the list.
    ///
    /// **SAFETY**: Caller must guarantee that `addr` is valid for writes of a
    /// `Node<T>`, properly aligned and not used by any other node.
    pub unsafe fn push_front(&mut self, data: T, addr: NonNull<u8>) -> NonNull<Node<T>> {
        let node = addr.cast::<Node<T>>();

        unsafe {
            node.as_ptr().write(Node {
                next: self.head,
                prev: None,
                data,
            });

            if let Some(mut head) = self.head {
                head.as_mut().prev = Some(node);
            } else {
                self.tail = Some(node);
            }
        }

        self.head = Some(node);
        self.len += 1;

        node
    }

    /// Appends a new node to the Linked List.
    ///
    /// It is very important for us that, because we are the actual memory
    /// allocator, this method can not make allocations itself. Therefor,
    /// it has to receive the `addr` where this node has to be allocated.
    ///
    /// This way, the node will we placed inside of our data structures in
    /// the exact place we want.
    ///
    /// **SAFETY**: Same contract as [`List::push_front`].
    pub unsafe fn append(&mut self, data: T, addr: NonNull<u8>) -> NonNull<Node<T>> {
        let node = addr.cast::<Node<T>>();

        unsafe {
            node.as_ptr().write(Node {
                next: None,
                prev: self.tail,
                data,
            });

            if let Some(mut tail) = self.tail {
                tail.as_mut().next = Some(node);
            } else {
                self.head = Some(node);
            }
        }

        self.tail = Some(node);
        self.len += 1;

        node
    }

    /// Writes a new node at `addr` and links it right after `target`. If
    /// `target` was the tail, the new node becomes the tail.
    ///
    /// **SAFETY**: `target` must belong to this list and `addr` must satisfy
    /// the contract of [`List::push_front`].
    pub unsafe fn insert_after(
        &mut self,
        mut target: NonNull<Node<T>>,
        data: T,
        addr: NonNull<u8>,
    ) -> NonNull<Node<T>> {
        let node = addr.cast::<Node<T>>();

        unsafe {
            let next = target.as_ref().next;

            node.as_ptr().write(Node {
                next,
                prev: Some(target),
                data,
            });

            match next {
                Some(mut next) => next.as_mut().prev = Some(node),
                None => self.tail = Some(node),
            }

            target.as_mut().next = Some(node);
        }

        self.len += 1;

        node
    }

    /// Unlinks `node` from the list. The memory of the node is left untouched,
    /// it belongs to whoever placed it there.
    ///
    /// **SAFETY**: `node` must belong to this list.
    pub unsafe fn remove(&mut self, node: NonNull<Node<T>>) {
        unsafe {
            let prev = node.as_ref().prev;
            let next = node.as_ref().next;

            match prev {
                Some(mut prev) => prev.as_mut().next = next,
                None => self.head = next,
            }

            match next {
                Some(mut next) => next.as_mut().prev = prev,
                None => self.tail = prev,
            }
        }

        self.len -= 1;
    }

    pub fn iter(&self) -> Iter<'_, T> {
        Iter {
            current: self.head,
            remaining: self.len,
            marker: PhantomData,
        }
    }

    pub fn nodes(&self) -> Nodes<'_, T> {
        Nodes {
            current: self.head,
            remaining: self.len,
            marker: PhantomData,
        }
    }
}

impl<'a, T> Iterator for Iter<'a, T> {
    type Item = &'a T;

    fn next(&mut self) -> Option<Self::Item> {
        let node = self.current?;

        unsafe {
            self.current = node.as_ref().next;
            self.remaining -= 1;

            Some(&node.as_ref().data)
        }
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.remaining, Some(self.remaining))
    }
}

impl<'a, T> Iterator for Nodes<'a, T> {
    type Item = NonNull<Node<T>>;

    fn next(&mut self) -> Option<Self::Item> {
        let node = self.current?;

        unsafe {
            self.current = node.as_ref().next;
        }
        self.remaining -= 1;

        Some(node)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.remaining, Some(self.remaining))
    }
}

impl<'a, T> IntoIterator for &'a List<T> {
    type Item = &'a T;
    type IntoIter = Iter<'a, T>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}
