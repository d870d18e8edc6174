pub mod abd;
pub mod bitops;
pub mod p2;
pub mod refcount;
pub mod sync;
pub mod taskq;

pub use abd::{Abd, AbdFlags};
pub use bitops::*;
pub use p2::*;
pub use refcount::Refcount;
pub use sync::{Condvar, Mutex, RwLock};
pub use taskq::{Taskq, TaskqPriority};



#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_i32() {
        let i: i32 = 0x011;
        println!("{:?}", i.p2align(0xff));
        println!("{:?}", i.bf_encode(4, 4).bf_decode(4, 4));
    }

    #[test]
    fn test_u32() {
        let i: u32 = 12;
        println!("{:?}", i.p2align(0xffff));
        println!("{:?}", i.p2nphase(40));
    }
}
