use rand::Rng;

/// Generate an application name of the form `spin-<word>-<word>-<NNNN>`.
///
/// Words are lowercase English words of 4 to 10 characters and the suffix is
/// a 4-digit integer, which keeps the collision probability low enough that
/// callers can treat names as unique.
pub fn generate_app_name() -> String {
    let mut rng = rand::thread_rng();
    let word1 = random_name_word(&mut rng);
    let word2 = random_name_word(&mut rng);
    let number: u16 = rng.gen_range(1000..=9999);
    format!("spin-{word1}-{word2}-{number}")
}

fn random_name_word(rng: &mut impl Rng) -> &'static str {
    loop {
        let len = rng.gen_range(4..=10);
        if let Some(word) = random_word::gen_len(len, random_word::Lang::En) {
            return word;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn names_have_the_expected_shape() {
        for _ in 0..100 {
            let name = generate_app_name();
            assert!(name.starts_with("spin-"), "bad prefix: {name}");
            assert!(
                name.chars()
                    .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-'),
                "bad characters: {name}"
            );
            let suffix = name.rsplit('-').next().unwrap();
            assert_eq!(suffix.len(), 4);
            assert!(suffix.chars().all(|c| c.is_ascii_digit()));
        }
    }

    #[test]
    fn a_thousand_names_are_nearly_all_unique() {
        let names: HashSet<String> = (0..1000).map(|_| generate_app_name()).collect();
        assert!(names.len() >= 999, "only {} unique names", names.len());
    }
}
