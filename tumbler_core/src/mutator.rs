use crate::input::Input;
use rand::Rng;
use rand_core::RngCore;

/// Lowest printable ASCII byte (space) used by `InsertRandomByteMutator`.
const PRINTABLE_ASCII_START: u8 = 0x20;
/// One past the highest printable ASCII byte (`~`).
const PRINTABLE_ASCII_END: u8 = 0x7F;

/// Tag-like fragments that no well-formed markup parser should accept.
pub const MALFORMED_TAGS: &[&[u8]] = &[
    b"<>",
    b"< >",
    b"</>",
    b"<///>",
    b"<tag",
    b"tag>",
    b"<<tag>>",
    b"<tag attr=>",
    b"<tag attr=\">",
    b"<tag attr=\" value>",
];

/// A `Mutator` derives one new `Input` from an existing one.
///
/// Mutators are stateless and never modify their argument. Given the same
/// random source state they produce the same output, which keeps a run
/// reproducible from its RNG seed.
///
/// When the input is too short for the operation (deleting from an empty
/// input, swapping inside a single byte), the mutator returns an unchanged
/// copy instead of failing.
///
/// # Type Parameters
/// * `I`: The type of `Input` this mutator operates on.
pub trait Mutator<I: Input> {
    /// Short, stable identifier used in logs and crash reports.
    fn name(&self) -> &'static str;

    /// Produces a mutated copy of `input`.
    ///
    /// # Arguments
    /// * `input`: The input to derive from. It is left untouched.
    /// * `rng`: Source of every random decision the mutator makes.
    fn mutate(&self, input: &I, rng: &mut dyn RngCore) -> I;
}

fn spliced<I: Input>(input: &I, position: usize, fragment: &[u8]) -> I {
    let bytes = input.as_bytes();
    let mut out = Vec::with_capacity(bytes.len() + fragment.len());
    out.extend_from_slice(&bytes[..position]);
    out.extend_from_slice(fragment);
    out.extend_from_slice(&bytes[position..]);
    I::from(out)
}

/// Inserts one random printable ASCII byte anywhere in `0..=len`.
///
/// Works on the empty input too, producing a single byte.
#[derive(Debug, Default, Clone, Copy)]
pub struct InsertRandomByteMutator;

impl<I: Input> Mutator<I> for InsertRandomByteMutator {
    fn name(&self) -> &'static str {
        "insert-random-byte"
    }

    fn mutate(&self, input: &I, rng: &mut dyn RngCore) -> I {
        let byte = rng.random_range(PRINTABLE_ASCII_START..PRINTABLE_ASCII_END);
        let position = rng.random_range(0..=input.len());
        spliced(input, position, &[byte])
    }
}

/// Copies a byte from somewhere in the input and inserts it at a random position.
#[derive(Debug, Default, Clone, Copy)]
pub struct InsertExistingByteMutator;

impl<I: Input> Mutator<I> for InsertExistingByteMutator {
    fn name(&self) -> &'static str {
        "insert-existing-byte"
    }

    fn mutate(&self, input: &I, rng: &mut dyn RngCore) -> I {
        if input.is_empty() {
            return input.clone();
        }
        let byte = input.as_bytes()[rng.random_range(0..input.len())];
        let position = rng.random_range(0..=input.len());
        spliced(input, position, &[byte])
    }
}

/// Repeats a random byte immediately after itself.
#[derive(Debug, Default, Clone, Copy)]
pub struct DuplicateByteMutator;

impl<I: Input> Mutator<I> for DuplicateByteMutator {
    fn name(&self) -> &'static str {
        "duplicate-byte"
    }

    fn mutate(&self, input: &I, rng: &mut dyn RngCore) -> I {
        if input.is_empty() {
            return input.clone();
        }
        let position = rng.random_range(0..input.len());
        let byte = input.as_bytes()[position];
        spliced(input, position + 1, &[byte])
    }
}

/// Removes one random byte.
#[derive(Debug, Default, Clone, Copy)]
pub struct DeleteByteMutator;

impl<I: Input> Mutator<I> for DeleteByteMutator {
    fn name(&self) -> &'static str {
        "delete-byte"
    }

    fn mutate(&self, input: &I, rng: &mut dyn RngCore) -> I {
        if input.is_empty() {
            return input.clone();
        }
        let position = rng.random_range(0..input.len());
        let mut bytes = input.as_bytes().to_vec();
        bytes.remove(position);
        I::from(bytes)
    }
}

/// Exchanges the bytes at two distinct random positions.
#[derive(Debug, Default, Clone, Copy)]
pub struct SwapBytesMutator;

impl<I: Input> Mutator<I> for SwapBytesMutator {
    fn name(&self) -> &'static str {
        "swap-bytes"
    }

    fn mutate(&self, input: &I, rng: &mut dyn RngCore) -> I {
        let len = input.len();
        if len < 2 {
            return input.clone();
        }
        let first = rng.random_range(0..len);
        // Draw from the remaining len - 1 slots so the positions never coincide.
        let mut second = rng.random_range(0..len - 1);
        if second >= first {
            second += 1;
        }
        let mut bytes = input.as_bytes().to_vec();
        bytes.swap(first, second);
        I::from(bytes)
    }
}

/// Flips the ASCII case of a random byte. Non-letters come back unchanged.
#[derive(Debug, Default, Clone, Copy)]
pub struct ToggleCaseMutator;

impl<I: Input> Mutator<I> for ToggleCaseMutator {
    fn name(&self) -> &'static str {
        "toggle-case"
    }

    fn mutate(&self, input: &I, rng: &mut dyn RngCore) -> I {
        if input.is_empty() {
            return input.clone();
        }
        let position = rng.random_range(0..input.len());
        let mut bytes = input.as_bytes().to_vec();
        let byte = bytes[position];
        bytes[position] = if byte.is_ascii_uppercase() {
            byte.to_ascii_lowercase()
        } else {
            byte.to_ascii_uppercase()
        };
        I::from(bytes)
    }
}

/// Flips a single random bit (0-7) of a random byte.
#[derive(Debug, Default, Clone, Copy)]
pub struct FlipBitMutator;

impl<I: Input> Mutator<I> for FlipBitMutator {
    fn name(&self) -> &'static str {
        "flip-bit"
    }

    fn mutate(&self, input: &I, rng: &mut dyn RngCore) -> I {
        if input.is_empty() {
            return input.clone();
        }
        let position = rng.random_range(0..input.len());
        let bit = rng.random_range(0u32..8);
        let mut bytes = input.as_bytes().to_vec();
        bytes[position] ^= 1 << bit;
        I::from(bytes)
    }
}

/// Splices one entry of [`MALFORMED_TAGS`] in at a random position.
#[derive(Debug, Default, Clone, Copy)]
pub struct MalformedTagMutator;

impl<I: Input> Mutator<I> for MalformedTagMutator {
    fn name(&self) -> &'static str {
        "malformed-tag"
    }

    fn mutate(&self, input: &I, rng: &mut dyn RngCore) -> I {
        let tag = MALFORMED_TAGS[rng.random_range(0..MALFORMED_TAGS.len())];
        let position = rng.random_range(0..=input.len());
        spliced(input, position, tag)
    }
}

/// One mutated input together with the mutator that produced it.
#[derive(Debug, Clone)]
pub struct Candidate<I: Input> {
    pub mutator: &'static str,
    pub input: I,
}

/// An ordered collection of mutators that are all applied to the seed each
/// iteration.
///
/// The order carries no meaning for correctness, but it is fixed so that a
/// seeded run replays identically.
pub struct MutatorSet<I: Input> {
    mutators: Vec<Box<dyn Mutator<I>>>,
}

impl<I: Input> MutatorSet<I> {
    pub fn new(mutators: Vec<Box<dyn Mutator<I>>>) -> Self {
        Self { mutators }
    }

    /// All eight built-in mutators.
    pub fn standard() -> Self {
        Self::new(vec![
            Box::new(InsertRandomByteMutator),
            Box::new(InsertExistingByteMutator),
            Box::new(DuplicateByteMutator),
            Box::new(DeleteByteMutator),
            Box::new(SwapBytesMutator),
            Box::new(ToggleCaseMutator),
            Box::new(FlipBitMutator),
            Box::new(MalformedTagMutator),
        ])
    }

    pub fn len(&self) -> usize {
        self.mutators.len()
    }

    pub fn is_empty(&self) -> bool {
        self.mutators.is_empty()
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.mutators.iter().map(|m| m.name()).collect()
    }

    /// Runs every mutator once against `seed`, in set order.
    pub fn mutate_all(&self, seed: &I, rng: &mut dyn RngCore) -> Vec<Candidate<I>> {
        self.mutators
            .iter()
            .map(|mutator| Candidate {
                mutator: mutator.name(),
                input: mutator.mutate(seed, rng),
            })
            .collect()
    }
}

impl<I: Input> Default for MutatorSet<I> {
    fn default() -> Self {
        Self::standard()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand_chacha::ChaCha8Rng;
    use rand_core::SeedableRng;

    const SEED_INPUT: &[u8] = b"<html a=\"value\">...</html>";

    fn seed() -> Vec<u8> {
        SEED_INPUT.to_vec()
    }

    fn sorted(bytes: &[u8]) -> Vec<u8> {
        let mut v = bytes.to_vec();
        v.sort_unstable();
        v
    }

    #[test]
    fn insertion_mutators_grow_by_one() {
        let mut rng = ChaCha8Rng::seed_from_u64(1);
        let input = seed();
        for _ in 0..100 {
            let a = InsertRandomByteMutator.mutate(&input, &mut rng);
            let b = InsertExistingByteMutator.mutate(&input, &mut rng);
            let c = DuplicateByteMutator.mutate(&input, &mut rng);
            assert_eq!(a.len(), input.len() + 1);
            assert_eq!(b.len(), input.len() + 1);
            assert_eq!(c.len(), input.len() + 1);
        }
        assert_eq!(input, SEED_INPUT, "Mutators must not touch their argument");
    }

    #[test]
    fn random_insertion_uses_printable_ascii() {
        let mut rng = ChaCha8Rng::seed_from_u64(2);
        let empty: Vec<u8> = Vec::new();
        for _ in 0..200 {
            let out = InsertRandomByteMutator.mutate(&empty, &mut rng);
            assert_eq!(out.len(), 1);
            assert!((0x20..0x7F).contains(&out[0]), "non-printable byte {:#x}", out[0]);
        }
    }

    #[test]
    fn existing_byte_insertion_keeps_alphabet() {
        let mut rng = ChaCha8Rng::seed_from_u64(3);
        let input = b"ab".to_vec();
        for _ in 0..50 {
            let out = InsertExistingByteMutator.mutate(&input, &mut rng);
            assert!(out.iter().all(|b| *b == b'a' || *b == b'b'));
        }
    }

    #[test]
    fn duplicate_places_copy_next_to_original() {
        let mut rng = ChaCha8Rng::seed_from_u64(4);
        let input = b"abcdef".to_vec();
        for _ in 0..50 {
            let out = DuplicateByteMutator.mutate(&input, &mut rng);
            let position = out
                .windows(2)
                .position(|w| w[0] == w[1])
                .expect("duplicated byte should be adjacent to itself");
            let mut restored = out.clone();
            restored.remove(position);
            assert_eq!(restored, input);
        }
    }

    #[test]
    fn delete_shrinks_by_one() {
        let mut rng = ChaCha8Rng::seed_from_u64(5);
        let input = seed();
        for _ in 0..100 {
            assert_eq!(DeleteByteMutator.mutate(&input, &mut rng).len(), input.len() - 1);
        }
        let single = b"x".to_vec();
        assert!(DeleteByteMutator.mutate(&single, &mut rng).is_empty());
    }

    #[test]
    fn swap_moves_exactly_two_distinct_positions() {
        let mut rng = ChaCha8Rng::seed_from_u64(6);
        let input = b"0123456789".to_vec();
        for _ in 0..200 {
            let out = SwapBytesMutator.mutate(&input, &mut rng);
            assert_eq!(sorted(&out), sorted(&input));
            let differing = out.iter().zip(&input).filter(|(a, b)| a != b).count();
            assert_eq!(differing, 2, "all bytes are distinct so a swap changes two slots");
        }
    }

    #[test]
    fn swap_is_noop_below_two_bytes() {
        let mut rng = ChaCha8Rng::seed_from_u64(7);
        let single = b"q".to_vec();
        assert_eq!(SwapBytesMutator.mutate(&single, &mut rng), single);
    }

    #[test]
    fn toggle_case_changes_letters_only() {
        let mut rng = ChaCha8Rng::seed_from_u64(8);
        let letters = b"aBcD".to_vec();
        for _ in 0..50 {
            let out = ToggleCaseMutator.mutate(&letters, &mut rng);
            assert_eq!(out.len(), letters.len());
            assert!(!out.eq(&letters));
            assert!(out.eq_ignore_ascii_case(&letters));
        }
        let digits = b"1234".to_vec();
        assert_eq!(ToggleCaseMutator.mutate(&digits, &mut rng), digits);
    }

    #[test]
    fn flip_bit_changes_exactly_one_bit() {
        let mut rng = ChaCha8Rng::seed_from_u64(9);
        let input = seed();
        for _ in 0..200 {
            let out = FlipBitMutator.mutate(&input, &mut rng);
            assert_eq!(out.len(), input.len());
            let flipped: u32 = out
                .iter()
                .zip(&input)
                .map(|(a, b)| (a ^ b).count_ones())
                .sum();
            assert_eq!(flipped, 1);
        }
    }

    #[test]
    fn malformed_tag_splices_a_catalog_entry() {
        let mut rng = ChaCha8Rng::seed_from_u64(10);
        let input = seed();
        for _ in 0..100 {
            let out = MalformedTagMutator.mutate(&input, &mut rng);
            let inserted = out.len() - input.len();
            let found = (0..=input.len()).any(|pos| {
                let fragment = &out[pos..pos + inserted];
                MALFORMED_TAGS.contains(&fragment)
                    && out[..pos] == input[..pos]
                    && out[pos + inserted..] == input[pos..]
            });
            assert!(found, "no catalog tag found in {:?}", String::from_utf8_lossy(&out));
        }
    }

    #[test]
    fn empty_input_is_left_alone_except_by_inserters() {
        let mut rng = ChaCha8Rng::seed_from_u64(11);
        let empty: Vec<u8> = Vec::new();
        for candidate in MutatorSet::standard().mutate_all(&empty, &mut rng) {
            match candidate.mutator {
                "insert-random-byte" => assert_eq!(candidate.input.len(), 1),
                "malformed-tag" => {
                    assert!(MALFORMED_TAGS.contains(&candidate.input.as_slice()))
                }
                _ => assert!(
                    candidate.input.is_empty(),
                    "{} should be a no-op on empty input",
                    candidate.mutator
                ),
            }
        }
    }

    #[test]
    fn mutate_all_yields_one_candidate_per_mutator_in_order() {
        let set: MutatorSet<Vec<u8>> = MutatorSet::standard();
        let mut rng = ChaCha8Rng::seed_from_u64(12);
        let candidates = set.mutate_all(&seed(), &mut rng);
        assert_eq!(set.len(), 8);
        assert_eq!(
            candidates.iter().map(|c| c.mutator).collect::<Vec<_>>(),
            set.names()
        );
    }

    #[test]
    fn same_rng_seed_replays_same_candidates() {
        let set: MutatorSet<Vec<u8>> = MutatorSet::standard();
        let mut first_rng = ChaCha8Rng::seed_from_u64(13);
        let mut second_rng = ChaCha8Rng::seed_from_u64(13);
        for _ in 0..20 {
            let a = set.mutate_all(&seed(), &mut first_rng);
            let b = set.mutate_all(&seed(), &mut second_rng);
            for (left, right) in a.iter().zip(&b) {
                assert_eq!(left.input, right.input);
            }
        }
    }
}
