//! C3 linearization.
//!
//! The merge is generic over any copyable identity so it can be tested without
//! a heap. The bridge feeds it heap ids; the tests feed it characters.

/// The merge got stuck: every remaining head appears in the tail of some sequence.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MroConflict<T> {
    /// The distinct heads of the sequences that were still unmerged, in order.
    pub heads: Vec<T>,
}

/// Merges `sequences` using the C3 rule.
///
/// Repeatedly takes the first head that does not appear in the tail of any
/// sequence, appends it to the output and removes it from every head.
pub fn c3_merge<T: Copy + Eq>(mut sequences: Vec<Vec<T>>) -> Result<Vec<T>, MroConflict<T>> {
    let mut result = Vec::new();
    loop {
        sequences.retain(|seq| !seq.is_empty());
        if sequences.is_empty() {
            return Ok(result);
        }

        let next = sequences
            .iter()
            .map(|seq| seq[0])
            .find(|&candidate| !sequences.iter().any(|other| other[1..].contains(&candidate)));

        let Some(next) = next else {
            let mut heads = Vec::new();
            for seq in &sequences {
                if !heads.contains(&seq[0]) {
                    heads.push(seq[0]);
                }
            }
            return Err(MroConflict { heads });
        };

        result.push(next);
        for seq in &mut sequences {
            if seq[0] == next {
                seq.remove(0);
            }
        }
    }
}

/// Linearizes a list of direct bases.
///
/// `base_mros[i]` must be the full MRO of `bases[i]` (starting with the base
/// itself). The returned order excludes the class being defined; callers
/// prepend it. The bases list itself takes part in the merge, which enforces
/// local precedence order.
pub fn linearize<T: Copy + Eq>(bases: &[T], base_mros: Vec<Vec<T>>) -> Result<Vec<T>, MroConflict<T>> {
    let mut sequences = base_mros;
    sequences.push(bases.to_vec());
    c3_merge(sequences)
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    /// Builds MROs for a small hierarchy described as `(class, bases)` pairs.
    fn hierarchy(defs: &[(char, &[char])]) -> Result<HashMap<char, Vec<char>>, MroConflict<char>> {
        let mut mros: HashMap<char, Vec<char>> = HashMap::new();
        for &(class, bases) in defs {
            let base_mros = bases.iter().map(|b| mros[b].clone()).collect();
            let mut mro = vec![class];
            mro.extend(linearize(bases, base_mros)?);
            mros.insert(class, mro);
        }
        Ok(mros)
    }

    #[test]
    fn single_inheritance_is_a_chain() {
        let mros = hierarchy(&[('O', &[]), ('A', &['O']), ('B', &['A'])]).unwrap();
        assert_eq!(mros[&'B'], vec!['B', 'A', 'O']);
    }

    #[test]
    fn diamond_visits_shared_base_last() {
        let mros = hierarchy(&[('O', &[]), ('A', &['O']), ('B', &['O']), ('C', &['A', 'B'])]).unwrap();
        assert_eq!(mros[&'C'], vec!['C', 'A', 'B', 'O']);
    }

    /// The example hierarchy from the Python 2.3 MRO write-up.
    #[test]
    fn python_documentation_example() {
        let mros = hierarchy(&[
            ('O', &[]),
            ('A', &['O']),
            ('B', &['O']),
            ('C', &['O']),
            ('D', &['O']),
            ('E', &['O']),
            ('1', &['A', 'B', 'C']),
            ('2', &['D', 'B', 'E']),
            ('3', &['D', 'A']),
            ('Z', &['1', '2', '3']),
        ])
        .unwrap();
        assert_eq!(
            mros[&'Z'],
            vec!['Z', '1', '2', '3', 'D', 'A', 'B', 'C', 'E', 'O']
        );
    }

    #[test]
    fn contradictory_orderings_conflict() {
        let err = hierarchy(&[
            ('O', &[]),
            ('A', &['O']),
            ('B', &['O']),
            ('X', &['A', 'B']),
            ('Y', &['B', 'A']),
            ('Z', &['X', 'Y']),
        ])
        .unwrap_err();
        assert_eq!(err.heads, vec!['A', 'B']);
    }

    #[test]
    fn local_precedence_is_enforced() {
        // class B(A); class C(A, B) is rejected even though [C, B, A, O] exists.
        let result = hierarchy(&[('O', &[]), ('A', &['O']), ('B', &['A']), ('C', &['A', 'B'])]);
        assert!(result.is_err());
    }

    #[test]
    fn no_bases_merges_to_empty() {
        assert_eq!(linearize::<char>(&[], Vec::new()).unwrap(), Vec::<char>::new());
    }
}
