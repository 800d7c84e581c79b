use core::fmt;
use managed::ManagedSlice;

use crate::socket::Session;
use crate::{Error, Result};

/// Opaque struct with space for storing one session.
///
/// This is public so you can use it to allocate space for storing
/// sessions when creating an Interface.
#[derive(Debug, Default)]
pub struct SessionStorage<'a> {
    inner: Option<Session<'a>>,
}

impl<'a> SessionStorage<'a> {
    pub const EMPTY: Self = Self { inner: None };
}

/// A handle, identifying a session in an Interface.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default, Hash)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct SessionHandle(usize);

impl fmt::Display for SessionHandle {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// An extensible set of sessions.
///
/// The lifetime `'a` is used when storing a `Session<'a>`.
#[derive(Debug)]
pub struct SessionSet<'a> {
    sessions: ManagedSlice<'a, SessionStorage<'a>>,
}

impl<'a> SessionSet<'a> {
    /// Create a session set using the provided storage.
    pub fn new<SessionsT>(sessions: SessionsT) -> SessionSet<'a>
    where
        SessionsT: Into<ManagedSlice<'a, SessionStorage<'a>>>,
    {
        let sessions = sessions.into();
        SessionSet { sessions }
    }

    /// Add a session to the set, and return its handle.
    ///
    /// Fails with `NoSpace` if the storage is fixed-size (not a `Vec`) and
    /// is full.
    pub fn add(&mut self, session: Session<'a>) -> Result<SessionHandle> {
        fn put<'a>(
            index: usize,
            slot: &mut SessionStorage<'a>,
            session: Session<'a>,
        ) -> SessionHandle {
            net_trace!("[{}]: adding", index);
            slot.inner = Some(session);
            SessionHandle(index)
        }

        for (index, slot) in self.sessions.iter_mut().enumerate() {
            if slot.inner.is_none() {
                return Ok(put(index, slot, session));
            }
        }

        match self.sessions {
            ManagedSlice::Borrowed(_) => {
                net_debug!("no room for a new session");
                Err(Error::NoSpace)
            }
            #[cfg(feature = "alloc")]
            ManagedSlice::Owned(ref mut sessions) => {
                sessions.push(SessionStorage { inner: None });
                let index = sessions.len() - 1;
                Ok(put(index, &mut sessions[index], session))
            }
        }
    }

    /// Get a session from the set by its handle.
    ///
    /// # Panics
    /// This function may panic if the handle does not belong to this session set.
    pub fn get(&self, handle: SessionHandle) -> &Session<'a> {
        match self.sessions[handle.0].inner.as_ref() {
            Some(session) => session,
            None => panic!("handle does not refer to a valid session"),
        }
    }

    /// Get a mutable session from the set by its handle.
    ///
    /// # Panics
    /// This function may panic if the handle does not belong to this session set.
    pub fn get_mut(&mut self, handle: SessionHandle) -> &mut Session<'a> {
        match self.sessions[handle.0].inner.as_mut() {
            Some(session) => session,
            None => panic!("handle does not refer to a valid session"),
        }
    }

    /// Remove a session from the set, without changing its state.
    ///
    /// # Panics
    /// This function may panic if the handle does not belong to this session set.
    pub fn remove(&mut self, handle: SessionHandle) -> Session<'a> {
        net_trace!("[{}]: removing", handle.0);
        match self.sessions[handle.0].inner.take() {
            Some(session) => session,
            None => panic!("handle does not refer to a valid session"),
        }
    }

    /// Get an iterator to the inner sessions.
    pub fn iter(&self) -> impl Iterator<Item = (SessionHandle, &Session<'a>)> {
        self.sessions
            .iter()
            .enumerate()
            .filter_map(|(n, x)| x.inner.as_ref().map(|x| (SessionHandle(n), x)))
    }

    /// Get a mutable iterator to the inner sessions.
    pub fn iter_mut(&mut self) -> impl Iterator<Item = (SessionHandle, &mut Session<'a>)> {
        self.sessions
            .iter_mut()
            .enumerate()
            .filter_map(|(n, x)| x.inner.as_mut().map(|x| (SessionHandle(n), x)))
    }
}
