// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

//! Canonical rolling k-mer with reset-on-ambiguous.

/// Sentinel fingerprint element meaning "no splitter on this side".
pub const NONE: u64 = u64::MAX;

/// Maximum supported k-mer length (64-bit encoding needs 2 bits/symbol).
pub const MAX_K: u32 = 31;

/// Maintains forward and reverse-complement 64-bit rolls of a DNA window and
/// reports the canonical (lexicographically smaller) of the two, along with
/// which strand produced it.
///
/// `insert` only accepts `0..=3` (A/C/G/T folded to 2 bits); callers must
/// route ambiguous symbols to [`KmerRoller::reset`] instead — passing a
/// value greater than 3 to `insert` is a programmer error.
#[derive(Debug, Clone)]
pub struct KmerRoller {
    k: u32,
    mask: u64,
    /// Shift applied when rolling a new symbol into the reverse-complement strand.
    rc_shift: u32,
    forward: u64,
    reverse_complement: u64,
    filled: u32,
    /// `true` once `filled >= k`.
    full: bool,
    /// Which side (forward vs. reverse-complement) produced the last canonical value.
    dir_oriented: bool,
}

impl KmerRoller {
    /// Creates a new roller for k-mers of length `k` (must be `1..=31`).
    #[must_use]
    pub fn new(k: u32) -> Self {
        assert!(k >= 1 && k <= MAX_K, "k must be in 1..={MAX_K}");
        Self {
            k,
            mask: (1u64 << (2 * k)) - 1,
            rc_shift: 2 * (k - 1),
            forward: 0,
            reverse_complement: 0,
            filled: 0,
            full: false,
            dir_oriented: true,
        }
    }

    /// The k-mer length this roller was constructed with.
    #[must_use]
    pub fn k(&self) -> u32 {
        self.k
    }

    /// Rolls in one 2-bit symbol (`0=A, 1=C, 2=G, 3=T`).
    ///
    /// # Panics
    ///
    /// Panics if `symbol > 3`; ambiguous bases must go through [`Self::reset`].
    pub fn insert(&mut self, symbol: u8) {
        assert!(symbol <= 3, "insert() called with non-ACGT symbol {symbol}; route ambiguous bases to reset()");

        self.forward = ((self.forward << 2) | u64::from(symbol)) & self.mask;

        // Complement is 3 - symbol; the new base enters the RC roll at the
        // high end since reverse-complementing also reverses order.
        let complement = 3 - u64::from(symbol);
        self.reverse_complement = (self.reverse_complement >> 2) | (complement << self.rc_shift);

        if self.filled < self.k {
            self.filled += 1;
            self.full = self.filled == self.k;
        }
    }

    /// Clears the roll and marks it "not full"; used on ambiguous bases and
    /// whenever the caller wants to start a fresh window (e.g. after
    /// accepting a splitter).
    pub fn reset(&mut self) {
        self.forward = 0;
        self.reverse_complement = 0;
        self.filled = 0;
        self.full = false;
    }

    /// Whether `k` valid symbols have been inserted since the last reset.
    #[must_use]
    pub fn is_full(&self) -> bool {
        self.full
    }

    /// The canonical k-mer value: the smaller of the forward and
    /// reverse-complement encodings. Ties (palindromic k-mers) favor the
    /// forward strand.
    ///
    /// Only meaningful once [`Self::is_full`] is `true`.
    #[must_use]
    pub fn value(&mut self) -> u64 {
        if self.forward <= self.reverse_complement {
            self.dir_oriented = true;
            self.forward
        } else {
            self.dir_oriented = false;
            self.reverse_complement
        }
    }

    /// Whether the forward strand produced the canonical value returned by
    /// the most recent call to [`Self::value`].
    #[must_use]
    pub fn is_dir_oriented(&self) -> bool {
        self.dir_oriented
    }

    /// Flips which strand is considered "canonical" for the current value;
    /// used by callers that need to reinterpret an already-computed k-mer
    /// under the opposite orientation convention.
    pub fn swap_dir_rc(&mut self) {
        self.dir_oriented = !self.dir_oriented;
    }
}

/// Folds an ASCII byte to its 2-bit code, case-insensitively; returns `None`
/// for anything that is not `A/C/G/T`.
#[must_use]
pub fn fold_base(byte: u8) -> Option<u8> {
    match byte {
        b'A' | b'a' => Some(0),
        b'C' | b'c' => Some(1),
        b'G' | b'g' => Some(2),
        b'T' | b't' => Some(3),
        _ => None,
    }
}
