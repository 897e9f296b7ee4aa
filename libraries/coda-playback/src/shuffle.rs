/// Shuffle order computation
///
/// The shuffle order is a derived permutation of track ids, recomputed
/// whenever membership, the current track, or the shuffle flag changes. It
/// is never persisted.
use coda_core::TrackId;
use rand::seq::SliceRandom;
use rand::thread_rng;

/// Compute a fresh shuffle permutation.
///
/// When `pinned_first` names an id present in `ids`, that id is placed
/// first and the remainder is shuffled uniformly (Fisher-Yates); otherwise
/// the whole list is shuffled.
pub fn shuffle_order(ids: &[TrackId], pinned_first: Option<TrackId>) -> Vec<TrackId> {
    let mut order: Vec<TrackId> = ids.to_vec();
    let mut rng = thread_rng();

    if let Some(pin) = pinned_first {
        if let Some(position) = order.iter().position(|id| *id == pin) {
            order.remove(position);
            order.shuffle(&mut rng);
            order.insert(0, pin);
            return order;
        }
    }

    order.shuffle(&mut rng);
    order
}
