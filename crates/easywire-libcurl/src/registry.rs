//! Registry pinning arbitrary objects behind opaque integer tokens.
//!
//! # Design
//! - Tokens are generation-checked slot indices, never addresses.
//! - Slot reuse bumps the generation so a released token can never resolve to
//!   a newer occupant; the stale use is reported instead.
//! - `Token::NONE` stands for "no object" and is accepted everywhere.

use std::any::Any;
use std::fmt::{self, Display, Formatter};
use std::rc::Rc;

use tracing::trace;

use crate::error::RegistryError;

/// Shared, type-erased object handed through the native boundary.
pub type Context = Rc<dyn Any>;

const INDEX_BITS: u32 = usize::BITS / 2;
const INDEX_MASK: usize = (1 << INDEX_BITS) - 1;
const GENERATION_MASK: usize = usize::MAX >> INDEX_BITS;

/// Opaque, registry-issued identifier of one pinned object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Token(usize);

impl Token {
    /// Sentinel meaning "no object".
    pub const NONE: Self = Self(0);

    /// Rebuild a token from the integer the engine handed back.
    #[must_use]
    pub const fn from_raw(raw: usize) -> Self {
        Self(raw)
    }

    /// Integer form suitable for a native opaque argument.
    #[must_use]
    pub const fn into_raw(self) -> usize {
        self.0
    }

    /// Whether this is the "no object" sentinel.
    #[must_use]
    pub const fn is_none(self) -> bool {
        self.0 == 0
    }

    const fn compose(index: usize, generation: usize) -> Self {
        Self(((generation & GENERATION_MASK) << INDEX_BITS) | (index + 1))
    }

    const fn index(self) -> usize {
        (self.0 & INDEX_MASK).wrapping_sub(1)
    }

    const fn generation(self) -> usize {
        self.0 >> INDEX_BITS
    }
}

impl Display for Token {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> fmt::Result {
        if self.is_none() {
            formatter.write_str("token(none)")
        } else {
            write!(
                formatter,
                "token({}@{})",
                self.index(),
                self.generation()
            )
        }
    }
}

#[derive(Default)]
struct Slot {
    generation: usize,
    value: Option<Context>,
}

/// Pins objects for as long as the native side may hand their token back.
#[derive(Default)]
pub struct HandleRegistry {
    slots: Vec<Slot>,
    free: Vec<usize>,
    live: usize,
}

impl HandleRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Pin `value` and return its token; `None` yields [`Token::NONE`].
    pub fn pin(&mut self, value: Option<Context>) -> Token {
        let Some(value) = value else {
            return Token::NONE;
        };

        let index = if let Some(index) = self.free.pop() {
            index
        } else {
            self.slots.push(Slot::default());
            self.slots.len() - 1
        };
        let slot = &mut self.slots[index];
        slot.value = Some(value);
        self.live += 1;

        let token = Token::compose(index, slot.generation);
        trace!(%token, live = self.live, "pinned object");
        token
    }

    /// Pin an owned value.
    pub fn pin_value<T: Any>(&mut self, value: T) -> Token {
        self.pin(Some(Rc::new(value) as Context))
    }

    /// Recover the object behind `token`.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::StaleToken`] for a released token and
    /// [`RegistryError::UnknownToken`] for a token this registry never issued.
    pub fn resolve(&self, token: Token) -> Result<Option<Context>, RegistryError> {
        if token.is_none() {
            return Ok(None);
        }
        let slot = self.slot(token)?;
        match &slot.value {
            Some(value) if slot.generation == token.generation() => Ok(Some(Rc::clone(value))),
            _ => Err(RegistryError::StaleToken { token }),
        }
    }

    /// Release the pin behind `token`; a no-op for [`Token::NONE`].
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::StaleToken`] when the token was already
    /// released and [`RegistryError::UnknownToken`] when it was never issued.
    pub fn release(&mut self, token: Token) -> Result<(), RegistryError> {
        if token.is_none() {
            return Ok(());
        }
        let index = token.index();
        let slot = self.slot_mut(token)?;
        if slot.value.is_none() || slot.generation != token.generation() {
            return Err(RegistryError::StaleToken { token });
        }
        slot.value = None;
        slot.generation = (slot.generation + 1) & GENERATION_MASK;
        self.free.push(index);
        self.live -= 1;
        trace!(%token, live = self.live, "released object");
        Ok(())
    }

    /// Number of live pins.
    #[must_use]
    pub const fn len(&self) -> usize {
        self.live
    }

    /// Whether no pins are live.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.live == 0
    }

    fn slot(&self, token: Token) -> Result<&Slot, RegistryError> {
        let slot = self
            .slots
            .get(token.index())
            .ok_or(RegistryError::UnknownToken { token })?;
        if token.generation() > slot.generation {
            return Err(RegistryError::UnknownToken { token });
        }
        Ok(slot)
    }

    fn slot_mut(&mut self, token: Token) -> Result<&mut Slot, RegistryError> {
        let slot = self
            .slots
            .get_mut(token.index())
            .ok_or(RegistryError::UnknownToken { token })?;
        if token.generation() > slot.generation {
            return Err(RegistryError::UnknownToken { token });
        }
        Ok(slot)
    }
}

impl fmt::Debug for HandleRegistry {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("HandleRegistry")
            .field("slots", &self.slots.len())
            .field("live", &self.live)
            .finish()
    }
}
