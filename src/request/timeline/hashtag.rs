use unicode_normalization::UnicodeNormalization;

const NON_ASCII_CHARS: &str = "ÀÁÂÃÄÅàáâãäåĀāĂăĄąÇçĆćĈĉĊċČčÐðĎďĐđÈÉÊËèéêëĒēĔĕĖėĘęĚěĜĝĞğĠġĢģĤĥĦħÌÍÎÏìíîïĨĩĪīĬĭĮįİıĴĵĶķĸĹĺĻļĽľĿŀŁłÑñŃńŅņŇňŉŊŋÒÓÔÕÖØòóôõöøŌōŎŏŐőŔŕŖŗŘřŚśŜŝŞşŠšſŢţŤťŦŧÙÚÛÜùúûüŨũŪūŬŭŮůŰűŲųŴŵÝýÿŶŷŸŹźŻżŽž";
const EQUIVALENT_ASCII_CHARS: &str = "AAAAAAaaaaaaAaAaAaCcCcCcCcCcDdDdDdEEEEeeeeEeEeEeEeEeGgGgGgGgHhHhIIIIiiiiIiIiIiIiIiJjKkkLlLlLlLlLlNnNnNnNnnNnOOOOOOooooooOoOoOoRrRrRrSsSsSsSssTtTtTtUUUUuuuuUuUuUuUuUuUuWwYyyYyYZzZzZz";

/// Normalize a hashtag the same way the web app does when it publishes to hashtag channels
pub fn normalize(tag: &str) -> String {
    tag.nfkc()
        .collect::<String>()
        .to_lowercase()
        .chars()
        .map(fold_to_ascii)
        .filter(|c| c.is_alphanumeric() || matches!(c, '_' | '\u{b7}' | '\u{200c}'))
        .collect()
}

fn fold_to_ascii(c: char) -> char {
    NON_ASCII_CHARS
        .chars()
        .zip(EQUIVALENT_ASCII_CHARS.chars())
        .find_map(|(non_ascii, ascii)| if non_ascii == c { Some(ascii) } else { None })
        .unwrap_or(c)
}
