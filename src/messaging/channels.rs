// Command channel - Lock-free SPSC queue from the scheduler to the render callback

use crate::messaging::command::AudioCommand;
use ringbuf::{HeapRb, traits::Split};

pub type CommandProducer = ringbuf::HeapProd<AudioCommand>;
pub type CommandConsumer = ringbuf::HeapCons<AudioCommand>;

pub fn create_command_channel(capacity: usize) -> (CommandProducer, CommandConsumer) {
    let rb = HeapRb::<AudioCommand>::new(capacity.max(1));
    rb.split()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::synth::click::ClickSound;
    use ringbuf::traits::{Consumer, Producer};

    #[test]
    fn test_queue_is_bounded_and_ordered() {
        let (mut tx, mut rx) = create_command_channel(2);
        let click = |start_sample| AudioCommand::TriggerClick {
            start_sample,
            sound: ClickSound::Click,
            accent: false,
            gain: 1.0,
        };

        assert!(tx.try_push(click(10)).is_ok());
        assert!(tx.try_push(click(20)).is_ok());
        assert!(tx.try_push(click(30)).is_err());

        assert_eq!(rx.try_pop(), Some(click(10)));
        assert_eq!(rx.try_pop(), Some(click(20)));
        assert_eq!(rx.try_pop(), None);
    }
}
