use base64::{prelude::BASE64_STANDARD, Engine};
use rand::distributions::{Alphanumeric, DistString};

pub fn random_string(len: usize) -> String {
    Alphanumeric.sample_string(&mut rand::thread_rng(), len)
}

pub fn decode_xml_base64(input: &str) -> Result<Vec<u8>, base64::DecodeError> {
    let stripped = input.replace([' ', '\n', '\r', '\t'], "");
    BASE64_STANDARD.decode(stripped)
}
