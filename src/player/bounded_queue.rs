use parking_lot::{Condvar, Mutex};
use std::collections::VecDeque;

/// 有界 FIFO 队列 - 单生产者/单消费者
///
/// push 在队列满时阻塞，pop 在队列空时阻塞，由此在生产者与消费者
/// 之间形成自然背压。close() 用于停机：唤醒所有等待者，之后 push
/// 失败，pop 先排空剩余元素再返回 None。
pub struct BoundedQueue<T> {
    inner: Mutex<QueueInner<T>>,
    not_full: Condvar,
    not_empty: Condvar,
    capacity: usize,
}

struct QueueInner<T> {
    items: VecDeque<T>,
    closed: bool,
}

impl<T> BoundedQueue<T> {
    /// 创建固定容量的队列（容量合法性由会话构建时统一校验）
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: Mutex::new(QueueInner {
                items: VecDeque::with_capacity(capacity),
                closed: false,
            }),
            not_full: Condvar::new(),
            not_empty: Condvar::new(),
            capacity,
        }
    }

    /// 入队，队列满时阻塞等待消费者腾出空位
    ///
    /// 队列已关闭时返回 Err 并原样退还元素
    pub fn push(&self, item: T) -> std::result::Result<(), T> {
        let mut inner = self.inner.lock();
        while inner.items.len() == self.capacity && !inner.closed {
            self.not_full.wait(&mut inner);
        }
        if inner.closed {
            return Err(item);
        }
        inner.items.push_back(item);
        self.not_empty.notify_one();
        Ok(())
    }

    /// 出队，队列空时阻塞等待生产者入队
    ///
    /// 队列关闭且已排空时返回 None
    pub fn pop(&self) -> Option<T> {
        let mut inner = self.inner.lock();
        loop {
            if let Some(item) = inner.items.pop_front() {
                self.not_full.notify_one();
                return Some(item);
            }
            if inner.closed {
                return None;
            }
            self.not_empty.wait(&mut inner);
        }
    }

    /// 非阻塞出队
    pub fn try_pop(&self) -> Option<T> {
        let mut inner = self.inner.lock();
        let item = inner.items.pop_front();
        if item.is_some() {
            self.not_full.notify_one();
        }
        item
    }

    /// 关闭队列并唤醒所有等待线程
    pub fn close(&self) {
        let mut inner = self.inner.lock();
        inner.closed = true;
        self.not_full.notify_all();
        self.not_empty.notify_all();
    }

    pub fn len(&self) -> usize {
        self.inner.lock().items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_full(&self) -> bool {
        self.len() == self.capacity
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;
    use std::time::Duration;

    #[test]
    fn test_fifo_order() {
        let queue = BoundedQueue::new(8);
        for i in 0..5 {
            queue.push(i).unwrap();
        }
        for i in 0..5 {
            assert_eq!(queue.pop(), Some(i));
        }
        assert!(queue.is_empty());
    }

    #[test]
    fn test_try_pop_empty() {
        let queue: BoundedQueue<u32> = BoundedQueue::new(4);
        assert_eq!(queue.try_pop(), None);
    }

    #[test]
    fn test_push_blocks_when_full() {
        let queue = Arc::new(BoundedQueue::new(3));
        let producer_queue = queue.clone();
        let (done_tx, done_rx) = crossbeam_channel::bounded(1);

        let producer = thread::spawn(move || {
            for i in 0..5 {
                producer_queue.push(i).unwrap();
            }
            done_tx.send(()).unwrap();
        });

        // 第 4 次 push 必须阻塞到有 pop 发生
        thread::sleep(Duration::from_millis(100));
        assert!(done_rx.try_recv().is_err());
        assert_eq!(queue.len(), 3);

        assert_eq!(queue.pop(), Some(0));
        assert_eq!(queue.pop(), Some(1));
        done_rx
            .recv_timeout(Duration::from_secs(2))
            .expect("producer should finish after pops");
        producer.join().unwrap();

        assert_eq!(queue.pop(), Some(2));
        assert_eq!(queue.pop(), Some(3));
        assert_eq!(queue.pop(), Some(4));
    }

    #[test]
    fn test_close_unblocks_producer() {
        let queue = Arc::new(BoundedQueue::new(1));
        queue.push(1u32).unwrap();

        let producer_queue = queue.clone();
        let producer = thread::spawn(move || producer_queue.push(2));

        thread::sleep(Duration::from_millis(50));
        queue.close();

        assert_eq!(producer.join().unwrap(), Err(2));
        // 已关闭队列先排空再返回 None
        assert_eq!(queue.pop(), Some(1));
        assert_eq!(queue.pop(), None);
    }
}
