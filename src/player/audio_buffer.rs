use crate::core::{PlayerError, Result};
use parking_lot::{Condvar, Mutex};
use std::time::{Duration, Instant};

/// 音频环形缓冲区
///
/// 一整块字节缓冲区，有效数据窗口为 [position, position + len)。
/// 生产者（解码线程）负责压缩窗口并在尾部追加新解码的数据，
/// 消费者（声卡回调）从头部取走数据。两侧各只有一个线程。
///
/// 消费者永远不阻塞：缓冲区为空时输出静音（全零），
/// 声卡回调必须在期限内返回。
pub struct AudioRingBuffer {
    inner: Mutex<WindowInner>,
    drained: Condvar,
    capacity: usize,
}

struct WindowInner {
    buf: Vec<u8>,
    position: usize,
    len: usize,
}

impl AudioRingBuffer {
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: Mutex::new(WindowInner {
                buf: vec![0u8; capacity],
                position: 0,
                len: 0,
            }),
            drained: Condvar::new(),
            capacity,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// 当前有效数据长度（字节）
    pub fn len(&self) -> usize {
        self.inner.lock().len
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// 窗口起始偏移（字节）
    pub fn position(&self) -> usize {
        self.inner.lock().position
    }

    /// 生产者：等待消费者把有效数据消耗到 threshold 以下
    ///
    /// cancelled 返回 true（停机）时立即放弃等待。
    pub fn wait_below<F: Fn() -> bool>(&self, threshold: usize, cancelled: F) {
        let mut inner = self.inner.lock();
        while inner.len > threshold && !cancelled() {
            // 带超时等待，保证停机标志能被及时观察到
            self.drained
                .wait_for(&mut inner, Duration::from_millis(10));
        }
    }

    /// 生产者：把有效窗口移回缓冲区头部，为追加腾出尾部空间
    pub fn compact(&self) {
        let mut inner = self.inner.lock();
        let (position, len) = (inner.position, inner.len);
        if position > 0 && len > 0 {
            inner.buf.copy_within(position..position + len, 0);
        }
        inner.position = 0;
    }

    /// 生产者：在窗口尾部追加解码好的采样字节
    ///
    /// 调用方必须先 compact；追加会越界时报资源错误而不是覆盖未读数据。
    pub fn append(&self, bytes: &[u8]) -> Result<()> {
        let mut inner = self.inner.lock();
        let tail = inner.position + inner.len;
        if tail + bytes.len() > self.capacity {
            return Err(PlayerError::ResourceExhausted(format!(
                "音频缓冲区溢出: {} + {} > {}",
                tail,
                bytes.len(),
                self.capacity
            )));
        }
        inner.buf[tail..tail + bytes.len()].copy_from_slice(bytes);
        inner.len += bytes.len();
        Ok(())
    }

    /// 消费者：取走 min(out.len, len) 字节，不足部分补零
    ///
    /// 永不阻塞。返回实际复制的字节数。
    pub fn pull(&self, out: &mut [u8]) -> usize {
        out.fill(0);
        let mut inner = self.inner.lock();
        let n = out.len().min(inner.len);
        if n > 0 {
            let position = inner.position;
            out[..n].copy_from_slice(&inner.buf[position..position + n]);
            inner.position += n;
            inner.len -= n;
        }
        drop(inner);
        self.drained.notify_one();
        n
    }

    /// 等待缓冲区被消费者完全排空，超时返回 false
    pub fn wait_drained(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut inner = self.inner.lock();
        while inner.len > 0 {
            let now = Instant::now();
            if now >= deadline {
                return false;
            }
            self.drained.wait_for(&mut inner, deadline - now);
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn test_write_then_partial_pull() {
        let ring = AudioRingBuffer::new(1024);
        let data: Vec<u8> = (0..60).collect();
        ring.append(&data).unwrap();

        let mut out = vec![0u8; 40];
        assert_eq!(ring.pull(&mut out), 40);
        assert_eq!(&out[..], &data[..40]);

        assert_eq!(ring.len(), 20);
        assert_eq!(ring.position(), 40);

        // 剩余 20 字节应与原始尾部一致
        let mut rest = vec![0u8; 20];
        assert_eq!(ring.pull(&mut rest), 20);
        assert_eq!(&rest[..], &data[40..]);
        assert!(ring.is_empty());
    }

    #[test]
    fn test_pull_empty_returns_silence() {
        let ring = AudioRingBuffer::new(256);
        let mut out = vec![0xffu8; 64];
        assert_eq!(ring.pull(&mut out), 0);
        assert!(out.iter().all(|&b| b == 0));
    }

    #[test]
    fn test_pull_more_than_available_zero_fills_rest() {
        let ring = AudioRingBuffer::new(256);
        ring.append(&[7u8; 10]).unwrap();
        let mut out = vec![0xffu8; 32];
        assert_eq!(ring.pull(&mut out), 10);
        assert!(out[..10].iter().all(|&b| b == 7));
        assert!(out[10..].iter().all(|&b| b == 0));
    }

    #[test]
    fn test_compact_preserves_window() {
        let ring = AudioRingBuffer::new(128);
        let data: Vec<u8> = (0..100).collect();
        ring.append(&data).unwrap();

        let mut out = vec![0u8; 80];
        ring.pull(&mut out);
        assert_eq!(ring.position(), 80);

        ring.compact();
        assert_eq!(ring.position(), 0);
        assert_eq!(ring.len(), 20);

        // 压缩后窗口内容不变，且尾部重新可写
        ring.append(&[0xaa; 100]).unwrap();
        let mut rest = vec![0u8; 20];
        ring.pull(&mut rest);
        assert_eq!(&rest[..], &data[80..]);
    }

    #[test]
    fn test_append_overflow_rejected() {
        let ring = AudioRingBuffer::new(16);
        ring.append(&[0u8; 12]).unwrap();
        assert!(matches!(
            ring.append(&[0u8; 8]),
            Err(PlayerError::ResourceExhausted(_))
        ));
        // 失败的追加不得破坏窗口
        assert_eq!(ring.len(), 12);
    }

    #[test]
    fn test_wait_below_wakes_on_drain() {
        let ring = Arc::new(AudioRingBuffer::new(1024));
        ring.append(&[1u8; 600]).unwrap();

        let consumer_ring = ring.clone();
        let consumer = thread::spawn(move || {
            let mut out = vec![0u8; 100];
            for _ in 0..5 {
                thread::sleep(Duration::from_millis(20));
                consumer_ring.pull(&mut out);
            }
        });

        ring.wait_below(200, || false);
        assert!(ring.len() <= 200);
        consumer.join().unwrap();
    }

    #[test]
    fn test_wait_below_cancellation() {
        let ring = AudioRingBuffer::new(1024);
        ring.append(&[1u8; 600]).unwrap();
        let start = Instant::now();
        // 没有消费者，取消条件必须让等待立刻退出
        ring.wait_below(100, || true);
        assert!(start.elapsed() < Duration::from_millis(100));
    }
}
