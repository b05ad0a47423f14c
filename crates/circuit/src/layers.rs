use crate::circuit::{Circuit, CircuitState};
use crate::error::{CircuitError, Result};

/// Onion-encrypts `plaintext` across every hop of `circuit`, iterating from
/// the exit hop (`N-1`) to the entry hop (`0`). Each layer is `nonce ||
/// ciphertext || tag`; the entry hop's layer is the outer envelope sent on
/// the wire (`spec.md` §4.9). Refused unless the circuit is `Established`.
pub fn encrypt_layers(circuit: &mut Circuit, plaintext: &[u8]) -> Result<Vec<u8>> {
    if circuit.state() != CircuitState::Established {
        return Err(CircuitError::NotEstablished);
    }
    let hop_count = circuit.hop_count();
    let mut data = plaintext.to_vec();
    for i in (0..hop_count).rev() {
        data = encrypt_for_hop(circuit, i, &data)?;
    }
    Ok(data)
}

/// Peels one layer per hop from entry (`0`) to exit (`N-1`), recovering the
/// original plaintext (`spec.md` §4.9).
pub fn decrypt_layers(circuit: &mut Circuit, ciphertext: &[u8]) -> Result<Vec<u8>> {
    if circuit.state() != CircuitState::Established {
        return Err(CircuitError::NotEstablished);
    }
    let hop_count = circuit.hop_count();
    let mut data = ciphertext.to_vec();
    for i in 0..hop_count {
        data = decrypt_from_hop(circuit, i, &data)?;
    }
    Ok(data)
}

/// Encrypts a single layer under hop `i`. Exposed separately from
/// [`encrypt_layers`] so a relay forwarding traffic can peel or add exactly
/// one layer without re-deriving the whole chain (`spec.md` §4.9).
pub fn encrypt_for_hop(circuit: &mut Circuit, i: usize, data: &[u8]) -> Result<Vec<u8>> {
    circuit.check_not_disposed()?;
    let hop_count = circuit.hop_count();
    if i >= hop_count {
        return Err(CircuitError::HopIndexOutOfRange(i));
    }
    circuit.hops_mut()[i].encrypt(data)
}

/// Decrypts a single layer peeled by hop `i`.
pub fn decrypt_from_hop(circuit: &mut Circuit, i: usize, data: &[u8]) -> Result<Vec<u8>> {
    circuit.check_not_disposed()?;
    let hop_count = circuit.hop_count();
    if i >= hop_count {
        return Err(CircuitError::HopIndexOutOfRange(i));
    }
    circuit.hops_mut()[i].decrypt(data)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hop::Hop;
    use std::time::Duration;

    fn established_circuit(hop_count: u8) -> Circuit {
        let mut circuit = Circuit::new(1, hop_count as usize, Duration::from_secs(60));
        for i in 0..hop_count {
            circuit
                .add_hop(Hop::new([i; 32], &[i; 32], i))
                .unwrap();
        }
        circuit.mark_established().unwrap();
        circuit
    }

    #[test]
    fn layered_roundtrip_with_three_hops() {
        // Sender-side circuit drives encryption; a circuit with identically
        // derived hop keys on the "receiving" side peels it back, mirroring
        // how each relay only ever touches its own layer in practice.
        let mut sender = established_circuit(3);
        let mut receiver = established_circuit(3);

        let onion = encrypt_layers(&mut sender, b"hello world").unwrap();
        let plaintext = decrypt_layers(&mut receiver, &onion).unwrap();
        assert_eq!(plaintext, b"hello world");
    }

    #[test]
    fn encrypt_layers_refused_before_established() {
        let mut circuit = Circuit::new(1, 1, Duration::from_secs(60));
        assert_eq!(
            encrypt_layers(&mut circuit, b"x"),
            Err(CircuitError::NotEstablished)
        );
    }

    #[test]
    fn encrypt_layers_refused_after_close() {
        let mut circuit = established_circuit(1);
        circuit.close();
        assert_eq!(
            encrypt_layers(&mut circuit, b"x"),
            Err(CircuitError::NotEstablished)
        );
    }

    #[test]
    fn per_hop_helpers_peel_exactly_one_layer() {
        let mut sender = established_circuit(2);
        let mut receiver = established_circuit(2);

        let layer1 = encrypt_for_hop(&mut sender, 1, b"inner").unwrap();
        let layer0 = encrypt_for_hop(&mut sender, 0, &layer1).unwrap();

        let peeled_at_entry = decrypt_from_hop(&mut receiver, 0, &layer0).unwrap();
        assert_eq!(peeled_at_entry, layer1);
        let peeled_at_exit = decrypt_from_hop(&mut receiver, 1, &peeled_at_entry).unwrap();
        assert_eq!(peeled_at_exit, b"inner");
    }

    #[test]
    fn hop_index_out_of_range_is_rejected() {
        let mut circuit = established_circuit(1);
        assert_eq!(
            encrypt_for_hop(&mut circuit, 5, b"x"),
            Err(CircuitError::HopIndexOutOfRange(5))
        );
    }
}
