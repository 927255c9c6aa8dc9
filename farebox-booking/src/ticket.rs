use rand::Rng;

/// Ticket codes are drawn from an unambiguous uppercase alphanumeric
/// alphabet. Uniqueness is NOT guaranteed here; the reservation store
/// enforces it atomically at confirmation and the caller retries on
/// collision.
const TICKET_ALPHABET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";

pub fn generate_with<R: Rng>(rng: &mut R, length: usize) -> String {
    (0..length)
        .map(|_| TICKET_ALPHABET[rng.gen_range(0..TICKET_ALPHABET.len())] as char)
        .collect()
}

pub fn generate(length: usize) -> String {
    generate_with(&mut rand::thread_rng(), length)
}
