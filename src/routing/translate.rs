use super::OBJECT_COUNT;

// -------------------------------------------------------------------------------------------------

/// Number of arrangements of the logical object triple.
pub const PERMUTATION_COUNT: usize = 6;

// -------------------------------------------------------------------------------------------------

/// All arrangements of the given triple, in a fixed order:
///
/// `[a b c]`, `[a c b]`, `[b a c]`, `[b c a]` (rotate left), `[c a b]` (rotate right), `[c b a]`.
pub fn permutations(triple: [i32; OBJECT_COUNT]) -> [[i32; OBJECT_COUNT]; PERMUTATION_COUNT] {
    let [a, b, c] = triple;
    [
        [a, b, c],
        [a, c, b],
        [b, a, c],
        [b, c, a],
        [c, a, b],
        [c, b, a],
    ]
}

/// Rewrite a sequence pattern for every arrangement of `new` objects.
///
/// For each permutation `p` of `new` (see [`permutations`]), every target token equal to
/// `old[i]` is replaced with `p[i]`. All three substitutions apply at once, so swapping ids
/// never rewrites an already substituted token again. Only whole target tokens are matched:
/// `1` never touches `12`, and repeat counts, `x` and whitespace are kept as they are.
pub fn translate(
    text: &str,
    old: [i32; OBJECT_COUNT],
    new: [i32; OBJECT_COUNT],
) -> [String; PERMUTATION_COUNT] {
    permutations(new).map(|arrangement| substitute(text, &old, &arrangement))
}

fn substitute(text: &str, old: &[i32; OBJECT_COUNT], new: &[i32; OBJECT_COUNT]) -> String {
    let mut result = String::with_capacity(text.len() + 8);
    let mut rest = text;
    while !rest.is_empty() {
        // copy leading whitespace
        let token_start = rest
            .find(|c: char| !c.is_whitespace())
            .unwrap_or(rest.len());
        result.push_str(&rest[..token_start]);
        rest = &rest[token_start..];
        if rest.is_empty() {
            break;
        }
        let token_end = rest.find(char::is_whitespace).unwrap_or(rest.len());
        let token = &rest[..token_end];
        let (target, repeat) = match token.find('*') {
            Some(pos) => token.split_at(pos),
            None => (token, ""),
        };
        match target
            .parse::<i32>()
            .ok()
            .and_then(|id| old.iter().position(|o| *o == id))
        {
            Some(index) => result.push_str(&new[index].to_string()),
            None => result.push_str(target),
        }
        result.push_str(repeat);
        rest = &rest[token_end..];
    }
    result
}

// -------------------------------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Sequence;

    #[test]
    fn permutations_are_distinct_bijections() {
        let triple = [1, 2, 3];
        let all = permutations(triple);
        for (index, arrangement) in all.iter().enumerate() {
            let mut sorted = *arrangement;
            sorted.sort();
            assert_eq!(sorted, triple);
            assert!(all[index + 1..].iter().all(|other| other != arrangement));
        }
    }

    #[test]
    fn translate_rotate_left() {
        let translations = translate("1 2 3", [1, 2, 3], [1, 2, 3]);
        assert_eq!(translations[0], "1 2 3");
        assert_eq!(translations[3], "2 3 1");
        assert_eq!(translations[4], "3 1 2");
        assert_eq!(translations[5], "3 2 1");
    }

    #[test]
    fn translate_keeps_counts_and_unrelated_tokens() {
        let translations = translate("1 12 3*5\tx 2*3 x*1 21", [1, 2, 3], [4, 5, 6]);
        assert_eq!(translations[0], "4 12 6*5\tx 5*3 x*1 21");
        assert_eq!(translations[5], "6 12 4*5\tx 5*3 x*1 21");
        // translated patterns stay valid
        for text in &translations {
            assert_eq!(Sequence::parse(text).unwrap().len(), 13);
        }
    }

    #[test]
    fn translate_swaps_simultaneously() {
        let translations = translate("1 2*2 3", [1, 2, 3], [2, 1, 3]);
        assert_eq!(translations[0], "2 1*2 3");
        assert_eq!(translations[2], "1 2*2 3");
        assert_eq!(translate("  ", [1, 2, 3], [4, 5, 6])[0], "  ");
    }
}
